//! Where `kindling paste` reads its body from.

use std::fmt;
use std::io::{IsTerminal, Read};
use std::path::Path;
use std::process::Command;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Source of a paste body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PasteSource {
    /// The clipboard.
    Clip,
    /// The X primary selection.
    Sel,
    /// Standard input.
    Stdin,
    /// A file named by the argument.
    File,
    /// The literal arguments.
    Arg,
    /// A file or the literal arguments when given, then piped stdin, then
    /// the clipboard.
    #[default]
    Auto,
}

impl fmt::Display for PasteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PasteSource::Clip => "clip",
            PasteSource::Sel => "sel",
            PasteSource::Stdin => "stdin",
            PasteSource::File => "file",
            PasteSource::Arg => "arg",
            PasteSource::Auto => "auto",
        };
        f.write_str(name)
    }
}

impl FromStr for PasteSource {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "clip" | "clipboard" => Ok(PasteSource::Clip),
            "sel" | "selection" => Ok(PasteSource::Sel),
            "stdin" | "-" => Ok(PasteSource::Stdin),
            "file" => Ok(PasteSource::File),
            "arg" => Ok(PasteSource::Arg),
            "auto" => Ok(PasteSource::Auto),
            _ => Err(Error::validation(
                format!("Invalid paste source: {s}. Valid options: clip, sel, stdin, file, arg, auto"),
                Some("from".to_string()),
            )),
        }
    }
}

/// Which X selection to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    /// The clipboard.
    Clipboard,
    /// The primary (middle-click) selection.
    Primary,
}

/// The outside world a paste body can come from.
pub trait PasteInput {
    /// True when stdin is attached to a terminal.
    fn stdin_is_terminal(&self) -> bool;

    /// Read all of stdin.
    fn read_stdin(&mut self) -> Result<String>;

    /// Read a selection.
    fn read_selection(&mut self, selection: Selection) -> Result<String>;
}

/// [`PasteInput`] backed by the process's stdin and the system clipboard tools.
#[derive(Debug, Default)]
pub struct SystemInput;

impl PasteInput for SystemInput {
    fn stdin_is_terminal(&self) -> bool {
        std::io::stdin().is_terminal()
    }

    fn read_stdin(&mut self) -> Result<String> {
        let mut body = String::new();
        std::io::stdin().read_to_string(&mut body)?;
        Ok(body)
    }

    fn read_selection(&mut self, selection: Selection) -> Result<String> {
        let candidates: &[&[&str]] = match selection {
            Selection::Clipboard => &[
                &["pbpaste"],
                &["wl-paste", "--no-newline"],
                &["xclip", "-selection", "clipboard", "-o"],
                &["xsel", "--clipboard", "--output"],
            ],
            Selection::Primary => &[
                &["wl-paste", "--primary", "--no-newline"],
                &["xclip", "-selection", "primary", "-o"],
                &["xsel", "--primary", "--output"],
            ],
        };
        for argv in candidates {
            let output = match Command::new(argv[0]).args(&argv[1..]).output() {
                Ok(output) => output,
                Err(_) => continue,
            };
            if output.status.success() {
                return String::from_utf8(output.stdout).map_err(|e| {
                    Error::validation(format!("selection is not UTF-8: {e}"), None)
                });
            }
        }
        Err(Error::validation(
            "no clipboard tool available (tried pbpaste, wl-paste, xclip, xsel)",
            Some("from".to_string()),
        ))
    }
}

/// Resolve the paste body for `source` given the free arguments.
///
/// The returned body is exactly what will be posted. An empty body is an error.
pub fn read_paste(source: PasteSource, args: &[String], input: &mut dyn PasteInput) -> Result<String> {
    let body = match source {
        PasteSource::Clip => input.read_selection(Selection::Clipboard)?,
        PasteSource::Sel => input.read_selection(Selection::Primary)?,
        PasteSource::Stdin => input.read_stdin()?,
        PasteSource::File => read_file(args)?,
        PasteSource::Arg => args.join(" "),
        PasteSource::Auto => {
            // Arguments are explicit; stdin may just be /dev/null under cron.
            if args.len() == 1 && Path::new(&args[0]).is_file() {
                read_file(args)?
            } else if !args.is_empty() {
                args.join(" ")
            } else if !input.stdin_is_terminal() {
                input.read_stdin()?
            } else {
                input.read_selection(Selection::Clipboard)?
            }
        }
    };
    if body.is_empty() {
        return Err(Error::validation(
            format!("nothing to paste from {source}"),
            Some("from".to_string()),
        ));
    }
    Ok(body)
}

fn read_file(args: &[String]) -> Result<String> {
    let [path] = args else {
        return Err(Error::validation(
            "paste --from=file takes exactly one filename",
            Some("filename".to_string()),
        ));
    };
    std::fs::read_to_string(path).map_err(|e| Error::io(format!("reading {path}: {e}"), e))
}
