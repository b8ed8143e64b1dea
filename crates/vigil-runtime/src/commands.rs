// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Interactive commands read from stdin.

use vigil_core::ActionValue;

/// One line of operator input.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Stop and exit.
    Quit,
    /// Print diagnostics.
    Status,
    /// Run one pipeline pass now.
    Tick,
    /// Save all documents now.
    Persist,
    /// The user changes a setting.
    Set {
        /// Target identifier.
        target: String,
        /// New value.
        value: ActionValue,
    },
    /// Simulation only: connect the charger.
    Plug,
    /// Simulation only: disconnect the charger.
    Unplug,
    /// Simulation only: set the battery level.
    Battery(f32),
    /// Simulation only: set CPU and GPU temperatures.
    Temps(f32, f32),
    /// Print the command list.
    Help,
}

/// Command summary printed by `help`.
pub const HELP: &str = "\
commands:
  status              print diagnostics
  tick                run the pipeline now
  persist             save state now
  set TARGET VALUE    change a setting as the user would
  plug | unplug       (simulation) charger on/off
  battery PERCENT     (simulation) set the charge level
  temps CPU GPU       (simulation) set temperatures
  quit                stop and exit";

/// Parses a setting value: booleans, integers, floats, then free text.
pub fn parse_value(text: &str) -> ActionValue {
    match text {
        "true" => ActionValue::Bool(true),
        "false" => ActionValue::Bool(false),
        _ => text
            .parse::<i64>()
            .map(ActionValue::Int)
            .or_else(|_| text.parse::<f64>().map(ActionValue::Float))
            .unwrap_or_else(|_| ActionValue::from(text)),
    }
}

/// Parses one input line.
pub fn parse_command(line: &str) -> Result<Command, String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let number = |word: Option<&&str>, what: &str| -> Result<f32, String> {
        word.ok_or_else(|| format!("missing {what}"))?
            .parse::<f32>()
            .map_err(|e| format!("bad {what}: {e}"))
    };
    match words.as_slice() {
        ["quit"] | ["exit"] | ["q"] => Ok(Command::Quit),
        ["status"] | ["s"] => Ok(Command::Status),
        ["tick"] => Ok(Command::Tick),
        ["persist"] => Ok(Command::Persist),
        ["help"] | ["?"] => Ok(Command::Help),
        ["plug"] => Ok(Command::Plug),
        ["unplug"] => Ok(Command::Unplug),
        ["set", target, value] => Ok(Command::Set {
            target: target.to_uppercase(),
            value: parse_value(value),
        }),
        ["battery", rest @ ..] => Ok(Command::Battery(number(rest.first(), "percent")?)),
        ["temps", rest @ ..] => Ok(Command::Temps(
            number(rest.first(), "cpu temperature")?,
            number(rest.get(1), "gpu temperature")?,
        )),
        [] => Err("empty command".to_string()),
        _ => Err(format!("unknown command {line:?}, try help")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_value_prefers_narrowest_type() {
        assert_eq!(parse_value("true"), ActionValue::Bool(true));
        assert_eq!(parse_value("false"), ActionValue::Bool(false));
        assert_eq!(parse_value("70"), ActionValue::Int(70));
        assert_eq!(parse_value("62.5"), ActionValue::Float(62.5));
        // RGB "off" is a mode name, not a switch.
        assert_eq!(parse_value("off"), ActionValue::from("off"));
        assert_eq!(parse_value("quiet"), ActionValue::from("quiet"));
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("quit"), Ok(Command::Quit));
        assert_eq!(
            parse_command("set display_brightness 70"),
            Ok(Command::Set {
                target: "DISPLAY_BRIGHTNESS".to_string(),
                value: ActionValue::Int(70)
            })
        );
        assert_eq!(parse_command("  temps 91 70 "), Ok(Command::Temps(91.0, 70.0)));
        assert_eq!(parse_command("battery 15"), Ok(Command::Battery(15.0)));
        assert!(parse_command("battery").unwrap_err().contains("missing percent"));
        assert!(parse_command("dance").is_err());
        assert!(parse_command("").is_err());
    }
}
