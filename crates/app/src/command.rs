use caya_chat::{QUICK_EMOJIS, Selection, TurnIndex, reaction_picker_emojis};
use snafu::{OptionExt, ResultExt, Snafu, ensure};

pub const HELP_TEXT: &str = "\
commands:
  <text>                         send a message
  /react <turn> <glyph|number>   react to a turn (numbers pick from the reaction set)
  /draft <text>                  put text in the compose field
  /caret <start> [end]           move the compose caret (byte offsets)
  /emoji <glyph|number>          insert an emoji at the caret
  /picker                        toggle the compose emoji picker
  /send                          send the compose field
  /model <id>                    switch model and save it
  /close, /open                  hide or show the conversation
  /help                          show this help
  /quit                          exit";

/// One line of terminal input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Submit(String),
    React { index: TurnIndex, glyph: String },
    Draft(String),
    Caret(Selection),
    Emoji(String),
    TogglePicker,
    Send,
    Model(String),
    Open,
    Close,
    Help,
    Quit,
}

#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum CommandError {
    #[snafu(display("unknown command `/{name}`, try /help"))]
    UnknownCommand { stage: &'static str, name: String },
    #[snafu(display("usage: {usage}"))]
    Usage {
        stage: &'static str,
        usage: &'static str,
    },
    #[snafu(display("`{value}` is not a number"))]
    NotANumber {
        stage: &'static str,
        value: String,
        source: std::num::ParseIntError,
    },
}

pub type CommandResult<T> = Result<T, CommandError>;

impl Command {
    pub fn parse(line: &str) -> CommandResult<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let Some(rest) = line.trim_start().strip_prefix('/') else {
            return Ok(Self::Submit(line.to_string()));
        };

        let (name, args) = match rest.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (rest, ""),
        };

        match name {
            "react" => {
                let mut parts = args.split_whitespace();
                let usage = UsageSnafu {
                    stage: "parse-react",
                    usage: "/react <turn> <glyph|number>",
                };
                let index = parts.next().context(usage)?;
                let glyph = parts.next().context(usage)?;
                Ok(Self::React {
                    index: TurnIndex::new(parse_number(index, "parse-react")?),
                    glyph: resolve_glyph(glyph, reaction_picker_emojis()),
                })
            }
            "draft" => Ok(Self::Draft(args.to_string())),
            "caret" => {
                let mut parts = args.split_whitespace();
                let start = parts.next().context(UsageSnafu {
                    stage: "parse-caret",
                    usage: "/caret <start> [end]",
                })?;
                let start = parse_number(start, "parse-caret")?;
                let end = match parts.next() {
                    Some(end) => parse_number(end, "parse-caret")?,
                    None => start,
                };
                Ok(Self::Caret(Selection::new(start, end)))
            }
            "emoji" => {
                ensure!(
                    !args.is_empty(),
                    UsageSnafu {
                        stage: "parse-emoji",
                        usage: "/emoji <glyph|number>",
                    }
                );
                Ok(Self::Emoji(resolve_glyph(args, &QUICK_EMOJIS)))
            }
            "picker" => Ok(Self::TogglePicker),
            "send" => Ok(Self::Send),
            "model" => {
                ensure!(
                    !args.is_empty(),
                    UsageSnafu {
                        stage: "parse-model",
                        usage: "/model <id>",
                    }
                );
                Ok(Self::Model(args.to_string()))
            }
            "open" => Ok(Self::Open),
            "close" => Ok(Self::Close),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" => Ok(Self::Quit),
            other => UnknownCommandSnafu {
                stage: "parse-command",
                name: other,
            }
            .fail(),
        }
    }
}

fn parse_number(value: &str, stage: &'static str) -> CommandResult<usize> {
    value.parse::<usize>().context(NotANumberSnafu { stage, value })
}

/// A 1-based number picks from `set`; anything else is taken as the glyph itself.
pub fn resolve_glyph(arg: &str, set: &[&str]) -> String {
    arg.parse::<usize>()
        .ok()
        .and_then(|number| number.checked_sub(1))
        .and_then(|position| set.get(position))
        .map_or_else(|| arg.to_string(), |glyph| (*glyph).to_string())
}
