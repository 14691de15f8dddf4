//! 终端命令解析

use labeler_core::{Label, LabelerError};
use std::path::PathBuf;

/// 交互命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Label(Label),
    Undo,
    SelectPatient(String),
    SelectStudy(String),
    /// 按位置选择患者 (从 1 开始)
    PatientAt(usize),
    /// 按位置选择当前患者的检查 (从 1 开始)
    StudyAt(usize),
    Export(PathBuf),
    ResetAll,
    StartOver,
    Logout,
    Progress,
    Dismiss,
    Help,
    Quit,
}

pub const HELP: &str = "\
  1-5          label the displayed study
  u            undo
  p <patient>  select patient
  s <study>    select study of the displayed patient
  n <index>    select patient by position
  N <index>    select study by position
  l            list progress
  e <path>     export labels as CSV
  r            reset all labels
  x            delete all data and start over
  o            log out
  d            dismiss messages
  h            help
  q            quit";

impl Command {
    pub fn parse(line: &str) -> Result<Command, String> {
        let line = line.trim();
        let (key, rest) = match line.split_once(char::is_whitespace) {
            Some((key, rest)) => (key, rest.trim()),
            None => (line, ""),
        };

        let command = match key {
            "1" | "2" | "3" | "4" | "5" => {
                let value: u8 = key.parse().map_err(|_| format!("Invalid label: {}", key))?;
                let label = Label::new(value).map_err(|e: LabelerError| e.to_string())?;
                Command::Label(label)
            }
            "u" => Command::Undo,
            "p" => Command::SelectPatient(required(rest, "p <patient>")?.to_string()),
            "s" => Command::SelectStudy(required(rest, "s <study>")?.to_string()),
            "n" => Command::PatientAt(position(rest)?),
            "N" => Command::StudyAt(position(rest)?),
            "e" => Command::Export(PathBuf::from(required(rest, "e <path>")?)),
            "r" => Command::ResetAll,
            "x" => Command::StartOver,
            "o" => Command::Logout,
            "l" => Command::Progress,
            "d" => Command::Dismiss,
            "h" | "?" => Command::Help,
            "q" => Command::Quit,
            "" => return Err("Empty command".to_string()),
            other => return Err(format!("Unknown command: {}", other)),
        };

        Ok(command)
    }
}

fn required<'a>(value: &'a str, usage: &str) -> Result<&'a str, String> {
    if value.is_empty() {
        Err(format!("Usage: {}", usage))
    } else {
        Ok(value)
    }
}

/// 解析从 1 开始的位置，转换为从 0 开始的下标
fn position(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(n) if n >= 1 => Ok(n - 1),
        _ => Err(format!("Expected a position starting at 1, got '{}'", value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_labels() {
        assert_eq!(Command::parse("3"), Ok(Command::Label(Label::new(3).unwrap())));
        assert!(Command::parse("6").is_err());
        assert!(Command::parse("0").is_err());
    }

    #[test]
    fn test_parse_navigation() {
        assert_eq!(
            Command::parse("p patient 12"),
            Ok(Command::SelectPatient("patient 12".to_string()))
        );
        assert_eq!(Command::parse("n 2"), Ok(Command::PatientAt(1)));
        assert_eq!(Command::parse("N 1"), Ok(Command::StudyAt(0)));
        assert!(Command::parse("n 0").is_err());
        assert!(Command::parse("s").is_err());
    }

    #[test]
    fn test_parse_misc() {
        assert_eq!(Command::parse("  u "), Ok(Command::Undo));
        assert_eq!(
            Command::parse("e out/labels.csv"),
            Ok(Command::Export(PathBuf::from("out/labels.csv")))
        );
        assert_eq!(Command::parse("q"), Ok(Command::Quit));
        assert!(Command::parse("zz").is_err());
        assert!(Command::parse("").is_err());
    }
}
