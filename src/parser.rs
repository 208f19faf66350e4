//! Line-oriented job file parser.
//!
//! Each non-blank line holds one command:
//!
//! ```text
//! CREATE <event_id> <num_rows> <num_columns>
//! RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]
//! SHOW <event_id>
//! LIST
//! WAIT <delay_ms> [thread_id]
//! BARRIER
//! HELP
//! ```
//!
//! Lines starting with `#` are comments. Malformed lines become [`Command::Invalid`]
//! so the dispatcher can report them and carry on.

use crate::store::{Coord, EventId};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::str::FromStr;
use strum::{EnumString, IntoStaticStr};

/// Largest number of seats accepted in a single RESERVE
pub const MAX_RESERVATION_SIZE: usize = 256;

pub const HELP_TEXT: &str = concat!(
    "Available commands:\n",
    "  CREATE <event_id> <num_rows> <num_columns>\n",
    "  RESERVE <event_id> [(<x1>,<y1>) (<x2>,<y2>) ...]\n",
    "  SHOW <event_id>\n",
    "  LIST\n",
    "  WAIT <delay_ms> [thread_id]\n",
    "  BARRIER\n",
    "  HELP\n",
);

static COORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\((\d+),(\d+)\)$").expect("coordinate pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Keyword {
    Create,
    Reserve,
    Show,
    List,
    Wait,
    Barrier,
    Help,
}

/// Which workers a WAIT applies to. Thread id `0` on the wire means every worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTarget {
    All,
    Worker(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Create {
        id: EventId,
        rows: usize,
        cols: usize,
    },
    Reserve {
        id: EventId,
        seats: Vec<Coord>,
    },
    Show {
        id: EventId,
    },
    List,
    Wait {
        delay_ms: u64,
        target: WaitTarget,
    },
    Help,
    Barrier,
    Empty,
    Invalid {
        reason: String,
    },
}

impl Command {
    fn invalid(reason: impl Into<String>) -> Self {
        Command::Invalid {
            reason: reason.into(),
        }
    }
}

/// A stream of commands claimed one at a time. `Ok(None)` marks end of stream.
pub trait CommandSource {
    fn next_command(&mut self) -> io::Result<Option<Command>>;
}

impl CommandSource for VecDeque<Command> {
    fn next_command(&mut self) -> io::Result<Option<Command>> {
        Ok(self.pop_front())
    }
}

/// Reads commands from any buffered reader, one line per command.
pub struct JobParser<R> {
    reader: R,
    line: Vec<u8>,
    line_number: usize,
}

impl<R: BufRead> JobParser<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_number: 0,
        }
    }

    pub fn line_number(&self) -> usize {
        self.line_number
    }
}

impl<R: BufRead> CommandSource for JobParser<R> {
    fn next_command(&mut self) -> io::Result<Option<Command>> {
        self.line.clear();
        if self.reader.read_until(b'\n', &mut self.line)? == 0 {
            return Ok(None);
        }
        self.line_number += 1;
        match std::str::from_utf8(&self.line) {
            Ok(line) => Ok(Some(parse_line(line))),
            Err(_) => Ok(Some(Command::invalid(format!(
                "line {} is not valid UTF-8",
                self.line_number
            )))),
        }
    }
}

pub fn parse_line(line: &str) -> Command {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Command::Empty;
    }

    let mut tokens = line.split_whitespace();
    let Some(head) = tokens.next() else {
        return Command::Empty;
    };
    let Ok(keyword) = Keyword::from_str(head) else {
        return Command::invalid(format!("unknown command '{head}'"));
    };
    let args: Vec<&str> = tokens.collect();

    match parse_args(keyword, &args) {
        Ok(command) => command,
        Err(reason) => Command::invalid(format!("{}: {reason}", <&str>::from(keyword))),
    }
}

fn parse_args(keyword: Keyword, args: &[&str]) -> Result<Command, String> {
    match keyword {
        Keyword::Create => {
            let [id, rows, cols] = args else {
                return Err("expected <event_id> <num_rows> <num_columns>".into());
            };
            Ok(Command::Create {
                id: number(id, "event_id")?,
                rows: number(rows, "num_rows")?,
                cols: number(cols, "num_columns")?,
            })
        }
        Keyword::Reserve => {
            let Some((id, rest)) = args.split_first() else {
                return Err("expected <event_id> followed by seats".into());
            };
            Ok(Command::Reserve {
                id: number(id, "event_id")?,
                seats: parse_seats(rest)?,
            })
        }
        Keyword::Show => {
            let [id] = args else {
                return Err("expected <event_id>".into());
            };
            Ok(Command::Show {
                id: number(id, "event_id")?,
            })
        }
        Keyword::Wait => {
            let (delay, thread) = match args {
                [delay] => (delay, None),
                [delay, thread] => (delay, Some(thread)),
                _ => return Err("expected <delay_ms> [thread_id]".into()),
            };
            let delay_ms = number(delay, "delay_ms")?;
            let target = match thread.map(|t| number::<usize>(t, "thread_id")).transpose()? {
                None | Some(0) => WaitTarget::All,
                Some(worker) => WaitTarget::Worker(worker),
            };
            Ok(Command::Wait { delay_ms, target })
        }
        Keyword::List | Keyword::Barrier | Keyword::Help => {
            if !args.is_empty() {
                return Err("takes no arguments".into());
            }
            Ok(match keyword {
                Keyword::List => Command::List,
                Keyword::Barrier => Command::Barrier,
                _ => Command::Help,
            })
        }
    }
}

fn number<T: FromStr>(token: &str, name: &str) -> Result<T, String> {
    token
        .parse()
        .map_err(|_| format!("{name} must be a non-negative integer, got '{token}'"))
}

/// Seats are written `[(r,c) (r,c) ...]`; the brackets may be omitted.
fn parse_seats(tokens: &[&str]) -> Result<Vec<Coord>, String> {
    let joined = tokens.join(" ");
    let inner = match joined.strip_prefix('[') {
        Some(rest) => rest
            .strip_suffix(']')
            .ok_or_else(|| "unterminated seat list".to_string())?,
        None => joined.as_str(),
    };

    let mut seats = Vec::new();
    for token in inner.split_whitespace() {
        let captures = COORD_PATTERN
            .captures(token)
            .ok_or_else(|| format!("malformed seat '{token}'"))?;
        let row = number(&captures[1], "row")?;
        let col = number(&captures[2], "col")?;
        seats.push(Coord::new(row, col));
        if seats.len() > MAX_RESERVATION_SIZE {
            return Err(format!("at most {MAX_RESERVATION_SIZE} seats per reservation"));
        }
    }

    if seats.is_empty() {
        return Err("at least one seat is required".into());
    }
    Ok(seats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_every_keyword() {
        assert_eq!(
            parse_line("CREATE 1 10 20\n"),
            Command::Create {
                id: 1,
                rows: 10,
                cols: 20
            }
        );
        assert_eq!(parse_line("SHOW 3"), Command::Show { id: 3 });
        assert_eq!(parse_line("LIST"), Command::List);
        assert_eq!(parse_line("BARRIER"), Command::Barrier);
        assert_eq!(parse_line("HELP"), Command::Help);
        assert_eq!(
            parse_line("WAIT 500"),
            Command::Wait {
                delay_ms: 500,
                target: WaitTarget::All
            }
        );
        assert_eq!(
            parse_line("WAIT 20 2"),
            Command::Wait {
                delay_ms: 20,
                target: WaitTarget::Worker(2)
            }
        );
        assert_eq!(
            parse_line("WAIT 20 0"),
            Command::Wait {
                delay_ms: 20,
                target: WaitTarget::All
            }
        );
    }

    #[test]
    fn reserve_accepts_bracketed_and_bare_lists() {
        let expected = Command::Reserve {
            id: 1,
            seats: vec![Coord::new(1, 1), Coord::new(1, 2)],
        };
        assert_eq!(parse_line("RESERVE 1 [(1,1) (1,2)]"), expected);
        assert_eq!(parse_line("RESERVE 1 [ (1,1) (1,2) ]"), expected);
        assert_eq!(parse_line("RESERVE 1 (1,1) (1,2)"), expected);
    }

    #[test]
    fn comments_and_blank_lines_are_empty() {
        assert_eq!(parse_line(""), Command::Empty);
        assert_eq!(parse_line("   \n"), Command::Empty);
        assert_eq!(parse_line("# CREATE 1 1 1"), Command::Empty);
    }

    #[test]
    fn malformed_lines_are_invalid() {
        for line in [
            "CREATE 1 2",
            "CREATE -1 2 2",
            "RESERVE 1",
            "RESERVE 1 [(1,1)",
            "RESERVE 1 [(a,1)]",
            "SHOW",
            "LIST 4",
            "WAIT",
            "WAIT 1 2 3",
            "create 1 1 1",
            "FROB",
        ] {
            assert_matches!(parse_line(line), Command::Invalid { .. }, "line: {line}");
        }
    }

    #[test]
    fn oversized_reservation_is_invalid() {
        let seats: Vec<String> = (1..=MAX_RESERVATION_SIZE + 1)
            .map(|c| format!("(1,{c})"))
            .collect();
        let line = format!("RESERVE 1 [{}]", seats.join(" "));
        assert_matches!(parse_line(&line), Command::Invalid { .. });
    }

    #[test]
    fn job_parser_yields_until_eof() {
        let input = "CREATE 1 1 1\n\nSHOW 1\n";
        let mut parser = JobParser::new(input.as_bytes());
        assert_matches!(parser.next_command().unwrap(), Some(Command::Create { .. }));
        assert_eq!(parser.next_command().unwrap(), Some(Command::Empty));
        assert_eq!(parser.next_command().unwrap(), Some(Command::Show { id: 1 }));
        assert_eq!(parser.next_command().unwrap(), None);
        assert_eq!(parser.line_number(), 3);
    }

    #[test]
    fn non_utf8_line_is_invalid_not_an_error() {
        let input: &[u8] = b"CREATE 1 1 1\nSHOW \xff\nLIST\n";
        let mut parser = JobParser::new(input);
        assert_matches!(parser.next_command().unwrap(), Some(Command::Create { .. }));
        assert_matches!(
            parser.next_command().unwrap(),
            Some(Command::Invalid { reason }) if reason.contains("line 2")
        );
        assert_eq!(parser.next_command().unwrap(), Some(Command::List));
        assert_eq!(parser.next_command().unwrap(), None);
    }
}
