//! Line-oriented chat loop and answer rendering.

use std::io::{self, BufRead, Write};

use gs_ai::citations::raw_grounding;
use gs_ai::generate::Generator;
use gs_ai::session::Session;
use gs_core::domain::Turn;
use gs_core::error::AppError;

const SNIPPET_CHARS: usize = 200;

pub const HELP: &str = "Commands: /reset clears the conversation, /debug toggles raw grounding output, /quit exits.";

fn read_line<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line))
}

fn snippet(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= SNIPPET_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(SNIPPET_CHARS).collect();
    format!("{cut}...")
}

pub fn render_turn<W: Write + ?Sized>(out: &mut W, turn: &Turn) -> io::Result<()> {
    writeln!(out, "\n{}", turn.text.trim_end())?;
    if turn.citations.is_empty() {
        return Ok(());
    }
    writeln!(out, "\nSources:")?;
    for (i, c) in turn.citations.iter().enumerate() {
        writeln!(out, "[{}] {}", i + 1, c.title)?;
        if !c.text.trim().is_empty() {
            writeln!(out, "    {}", snippet(&c.text))?;
        }
        if let Some(uri) = c.uri.as_deref() {
            writeln!(out, "    {uri}")?;
        }
    }
    Ok(())
}

pub fn render_error<W: Write + ?Sized>(out: &mut W, err: &AppError) -> io::Result<()> {
    writeln!(out, "\nError: {err}")?;
    if let Some(details) = err.details.as_deref() {
        writeln!(out, "  {details}")?;
    }
    if err.retryable {
        writeln!(out, "  This looks temporary; try again.")?;
    }
    Ok(())
}

pub fn render_raw<W: Write + ?Sized>(out: &mut W, session: &Session) -> io::Result<()> {
    if let Some(raw) = session.last_raw() {
        let pretty = serde_json::to_string_pretty(&raw_grounding(raw))
            .unwrap_or_else(|e| format!("<unprintable: {e}>"));
        writeln!(out, "\nRaw grounding metadata:\n{pretty}")?;
    }
    Ok(())
}

/// Runs until `/quit` or end of input. Query failures are shown and the loop continues.
pub fn chat_loop<R: BufRead, W: Write + ?Sized>(
    session: &mut Session,
    generator: &dyn Generator,
    input: &mut R,
    out: &mut W,
) -> io::Result<()> {
    loop {
        if session.needs_store() {
            write!(out, "\nFile Search Store ID (fileSearchStores/...): ")?;
            out.flush()?;
            let Some(line) = read_line(input)? else {
                return Ok(());
            };
            let raw = line.trim();
            if raw == "/quit" {
                return Ok(());
            }
            if raw.is_empty() {
                writeln!(out, "Please enter a Store ID.")?;
                continue;
            }
            match session.provide_store_id(raw) {
                Ok(id) => writeln!(out, "Using store {id}.")?,
                Err(e) => render_error(out, &e)?,
            }
            continue;
        }

        write!(out, "\n> ")?;
        out.flush()?;
        let Some(line) = read_line(input)? else {
            return Ok(());
        };
        let question = line.trim();
        match question {
            "" => continue,
            "/quit" | "/exit" => return Ok(()),
            "/help" => {
                writeln!(out, "{HELP}")?;
                continue;
            }
            "/reset" => {
                session.reset();
                writeln!(out, "Conversation cleared.")?;
                continue;
            }
            "/debug" => {
                let on = !session.debug();
                session.set_debug(on);
                writeln!(out, "Debug output {}.", if on { "on" } else { "off" })?;
                continue;
            }
            _ => {}
        }

        match session.submit(generator, question) {
            Ok(turn) => {
                let turn = turn.clone();
                render_turn(out, &turn)?;
                render_raw(out, session)?;
            }
            Err(e) => {
                render_error(out, &e)?;
                session.acknowledge_error();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gs_core::domain::{Citation, Role};

    #[test]
    fn long_citation_text_is_cut_on_char_boundary() {
        let long = "é".repeat(SNIPPET_CHARS + 5);
        let s = snippet(&long);
        assert!(s.ends_with("..."));
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
        assert_eq!(snippet("  short  "), "short");
    }

    #[test]
    fn turn_lists_numbered_sources() {
        let turn = Turn {
            role: Role::Assistant,
            text: "Press New.".to_string(),
            citations: vec![
                Citation {
                    title: "Job Planning User Guide".to_string(),
                    text: "Select New.".to_string(),
                    uri: None,
                },
                Citation {
                    title: "Unknown Source".to_string(),
                    text: String::new(),
                    uri: Some("doc://2".to_string()),
                },
            ],
        };
        let mut out = Vec::new();
        render_turn(&mut out, &turn).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Press New."));
        assert!(text.contains("[1] Job Planning User Guide\n    Select New."));
        assert!(text.contains("[2] Unknown Source\n    doc://2"));
    }
}
