//! Line-oriented dive scripts.
//!
//! ```text
//! # canonical sample
//! set gf 50 85
//! gas air oc 21 0
//! travel 20 rate 10 on air
//! hold 20 for 30 on air
//! report
//! ```
//!
//! Gas fractions are given in percent, setpoints in bar, depths in metres,
//! times in minutes. `set` lines must precede the first gas or segment.

use std::collections::HashMap;

use nom::{
    branch::alt,
    bytes::complete::{tag_no_case, take_while1},
    character::complete::{i32 as parse_i32, space0, space1, u8 as parse_u8},
    combinator::{map, value},
    number::complete::double,
    sequence::preceded,
    IResult, Parser,
};

use crate::config::{CeilingType, DiveConfig, StopFormatting};
use crate::error::ScriptError;
use crate::session::{DiveSession, DiveSnapshot};

type NomError<'a> = nom::error::Error<&'a str>;

#[derive(Debug, Clone, PartialEq)]
pub enum Setting {
    GradientFactors { low: u8, high: u8 },
    SurfacePressure(i32),
    AscentRate(f64),
    WaterDensity(f64),
    LastStop(f64),
    MinPpO2(f64),
    MaxPpO2(f64),
    Ceiling(CeilingType),
    Stops(StopFormatting),
    RoundCeiling(bool),
    RecalcAll(bool),
}

impl Setting {
    fn apply(&self, config: &mut DiveConfig) {
        match *self {
            Setting::GradientFactors { low, high } => {
                config.gf_low = low;
                config.gf_high = high;
            }
            Setting::SurfacePressure(mbar) => config.surface_pressure = mbar,
            Setting::AscentRate(rate) => config.deco_ascent_rate = rate,
            Setting::WaterDensity(density) => config.water_density = density,
            Setting::LastStop(depth) => config.last_stop_depth = depth,
            Setting::MinPpO2(pp_o2) => config.min_pp_o2 = pp_o2,
            Setting::MaxPpO2(pp_o2) => config.pp_o2_hard_limit = Some(pp_o2),
            Setting::Ceiling(ceiling_type) => config.ceiling_type = ceiling_type,
            Setting::Stops(formatting) => config.stop_formatting = formatting,
            Setting::RoundCeiling(on) => config.round_ceiling = on,
            Setting::RecalcAll(on) => config.recalc_all_tissues_m_values = on,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GasSpec {
    /// O2 and He in percent.
    OpenCircuit { o2: f64, he: f64 },
    /// Setpoint in bar, diluent O2 and He in percent.
    ClosedCircuit { setpoint: f64, o2: f64, he: f64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Set(Setting),
    Gas { name: String, spec: GasSpec },
    TravelAtRate { depth: f64, rate: f64, gas: String },
    TravelOver { depth: f64, minutes: f64, gas: String },
    Hold { depth: f64, minutes: f64, gas: String },
    Report,
}

/// A parsed command and the 1-based line it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptLine {
    pub line: usize,
    pub command: Command,
}

/// Parse a whole script. Blank lines and `#` comments are skipped.
pub fn parse_script(source: &str) -> Result<Vec<ScriptLine>, ScriptError> {
    let mut lines = Vec::new();
    for (index, raw) in source.lines().enumerate() {
        let line = index + 1;
        let text = raw.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            continue;
        }
        let command = parse_line(text).map_err(|message| ScriptError::Parse { line, message })?;
        lines.push(ScriptLine { line, command });
    }
    Ok(lines)
}

fn parse_line(text: &str) -> Result<Command, String> {
    match command(text) {
        Ok((remaining, command)) => {
            let remaining = remaining.trim();
            if remaining.is_empty() {
                Ok(command)
            } else {
                Err(format!("unexpected characters: '{}'", remaining))
            }
        }
        Err(_) => Err(format!("unrecognised command: '{}'", text)),
    }
}

/// Run a script against a fresh session, collecting a snapshot at every `report`.
pub fn run_script(source: &str) -> Result<Vec<DiveSnapshot>, ScriptError> {
    let mut config = DiveConfig::default();
    let mut session: Option<DiveSession> = None;
    let mut gases: HashMap<String, u32> = HashMap::new();
    let mut reports = Vec::new();

    for ScriptLine { line, command } in parse_script(source)? {
        if let Command::Set(setting) = &command {
            if session.is_some() {
                return Err(ScriptError::SettingAfterStart { line });
            }
            setting.apply(&mut config);
            continue;
        }

        let active = match session.take() {
            Some(active) => active,
            None => DiveSession::new(config.clone())
                .map_err(|source| ScriptError::Engine { line, source })?,
        };
        let session = session.insert(active);
        let lookup = |name: &str| {
            gases.get(name).copied().ok_or_else(|| ScriptError::UnknownGas {
                line,
                name: name.to_string(),
            })
        };

        let outcome = match command {
            Command::Gas { name, spec } => {
                let registered = match spec {
                    GasSpec::OpenCircuit { o2, he } => {
                        session.add_open_circuit(o2 / 100.0, he / 100.0)
                    }
                    GasSpec::ClosedCircuit { setpoint, o2, he } => {
                        session.add_closed_circuit(setpoint, o2 / 100.0, he / 100.0)
                    }
                };
                registered.map(|index| {
                    gases.insert(name, index);
                })
            }
            Command::TravelAtRate { depth, rate, gas } => {
                let index = lookup(&gas)?;
                session.record_travel_with_rate(depth, rate, index)
            }
            Command::TravelOver {
                depth,
                minutes,
                gas,
            } => {
                let index = lookup(&gas)?;
                session.record_travel(depth, minutes, index)
            }
            Command::Hold {
                depth,
                minutes,
                gas,
            } => {
                let index = lookup(&gas)?;
                session.record_segment(depth, minutes * 60.0, index)
            }
            Command::Report => {
                reports.push(session.complete_state());
                Ok(())
            }
            Command::Set(_) => Ok(()),
        };
        outcome.map_err(|source| ScriptError::Engine { line, source })?;
    }
    Ok(reports)
}

fn arg<'a, O, F>(inner: F) -> impl Parser<&'a str, Output = O, Error = NomError<'a>>
where
    F: Parser<&'a str, Output = O, Error = NomError<'a>>,
{
    preceded(space1, inner)
}

fn keyword<'a>(
    word: &'static str,
) -> impl Parser<&'a str, Output = &'a str, Error = NomError<'a>> {
    preceded(space1, tag_no_case(word))
}

fn name(input: &str) -> IResult<&str, String> {
    map(
        take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '-' || c == '.'),
        |s: &str| s.to_string(),
    )
    .parse(input)
}

fn switch(input: &str) -> IResult<&str, bool> {
    alt((
        value(true, tag_no_case("on")),
        value(false, tag_no_case("off")),
    ))
    .parse(input)
}

fn command(input: &str) -> IResult<&str, Command> {
    let (input, _) = space0(input)?;
    alt((
        set_command,
        gas_command,
        travel_command,
        hold_command,
        value(Command::Report, tag_no_case("report")),
    ))
    .parse(input)
}

fn set_command(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_no_case("set").parse(input)?;
    let (input, _) = space1(input)?;
    map(
        alt((
            gradient_factors,
            map(
                preceded(tag_no_case("surface_pressure"), arg(parse_i32)),
                Setting::SurfacePressure,
            ),
            numeric("ascent_rate", Setting::AscentRate),
            numeric("water_density", Setting::WaterDensity),
            numeric("last_stop", Setting::LastStop),
            numeric("min_ppo2", Setting::MinPpO2),
            numeric("max_ppo2", Setting::MaxPpO2),
            map(
                preceded(
                    tag_no_case("ceiling"),
                    arg(alt((
                        value(CeilingType::Actual, tag_no_case("actual")),
                        value(CeilingType::Adaptive, tag_no_case("adaptive")),
                    ))),
                ),
                Setting::Ceiling,
            ),
            map(
                preceded(
                    tag_no_case("stops"),
                    arg(alt((
                        value(StopFormatting::Metric, tag_no_case("metric")),
                        value(StopFormatting::Imperial, tag_no_case("imperial")),
                        value(StopFormatting::Continuous, tag_no_case("continuous")),
                    ))),
                ),
                Setting::Stops,
            ),
            map(
                preceded(tag_no_case("round_ceiling"), arg(switch)),
                Setting::RoundCeiling,
            ),
            map(
                preceded(tag_no_case("recalc_all"), arg(switch)),
                Setting::RecalcAll,
            ),
        )),
        Command::Set,
    )
    .parse(input)
}

fn numeric<'a>(
    key: &'static str,
    build: fn(f64) -> Setting,
) -> impl Parser<&'a str, Output = Setting, Error = NomError<'a>> {
    map(preceded(tag_no_case(key), arg(double)), build)
}

fn gradient_factors(input: &str) -> IResult<&str, Setting> {
    let (input, _) = tag_no_case("gf").parse(input)?;
    let (input, low) = arg(parse_u8).parse(input)?;
    let (input, high) = arg(parse_u8).parse(input)?;
    Ok((input, Setting::GradientFactors { low, high }))
}

fn gas_command(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_no_case("gas").parse(input)?;
    let (input, name) = arg(name).parse(input)?;
    let (input, spec) = alt((open_circuit, closed_circuit)).parse(input)?;
    Ok((input, Command::Gas { name, spec }))
}

fn open_circuit(input: &str) -> IResult<&str, GasSpec> {
    let (input, _) = keyword("oc").parse(input)?;
    let (input, o2) = arg(double).parse(input)?;
    let (input, he) = arg(double).parse(input)?;
    Ok((input, GasSpec::OpenCircuit { o2, he }))
}

fn closed_circuit(input: &str) -> IResult<&str, GasSpec> {
    let (input, _) = keyword("ccr").parse(input)?;
    let (input, setpoint) = arg(double).parse(input)?;
    let (input, o2) = arg(double).parse(input)?;
    let (input, he) = arg(double).parse(input)?;
    Ok((input, GasSpec::ClosedCircuit { setpoint, o2, he }))
}

/// `on NAME`, closing every segment command.
fn breathing(input: &str) -> IResult<&str, String> {
    let (input, _) = keyword("on").parse(input)?;
    arg(name).parse(input)
}

fn travel_command(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_no_case("travel").parse(input)?;
    let (input, depth) = arg(double).parse(input)?;
    let (input, command) = alt((
        map(
            (preceded(keyword("rate"), arg(double)), breathing),
            move |(rate, gas)| Command::TravelAtRate { depth, rate, gas },
        ),
        map(
            (preceded(keyword("over"), arg(double)), breathing),
            move |(minutes, gas)| Command::TravelOver {
                depth,
                minutes,
                gas,
            },
        ),
    ))
    .parse(input)?;
    Ok((input, command))
}

fn hold_command(input: &str) -> IResult<&str, Command> {
    let (input, _) = tag_no_case("hold").parse(input)?;
    let (input, depth) = arg(double).parse(input)?;
    let (input, minutes) = preceded(keyword("for"), arg(double)).parse(input)?;
    let (input, gas) = breathing(input)?;
    Ok((
        input,
        Command::Hold {
            depth,
            minutes,
            gas,
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecoError;

    const CANONICAL: &str = "\
# canonical sample
set gf 50 85
set surface_pressure 1013

gas air oc 21 0
travel 20 rate 10 on air
hold 20 for 30 on air
report
travel 15 over 3 on air   # slow ascent
hold 15 for 30 on air
report
";

    #[test]
    fn test_parse_commands() {
        let lines = parse_script(CANONICAL).unwrap();
        assert_eq!(lines.len(), 8);
        assert_eq!(lines[0].line, 2);
        assert_eq!(
            lines[0].command,
            Command::Set(Setting::GradientFactors { low: 50, high: 85 })
        );
        assert_eq!(
            lines[2].command,
            Command::Gas {
                name: "air".to_string(),
                spec: GasSpec::OpenCircuit { o2: 21.0, he: 0.0 },
            }
        );
        assert_eq!(
            lines[3].command,
            Command::TravelAtRate {
                depth: 20.0,
                rate: 10.0,
                gas: "air".to_string(),
            }
        );
        assert_eq!(
            lines[6].command,
            Command::TravelOver {
                depth: 15.0,
                minutes: 3.0,
                gas: "air".to_string(),
            }
        );
        assert_eq!(lines[6].line, 9);
    }

    #[test]
    fn test_parse_settings() {
        let cases = [
            ("set ascent_rate 9", Setting::AscentRate(9.0)),
            ("set water_density 1020", Setting::WaterDensity(1020.0)),
            ("set last_stop 6", Setting::LastStop(6.0)),
            ("set min_ppo2 0.18", Setting::MinPpO2(0.18)),
            ("set max_ppo2 1.4", Setting::MaxPpO2(1.4)),
            ("set ceiling adaptive", Setting::Ceiling(CeilingType::Adaptive)),
            ("set stops imperial", Setting::Stops(StopFormatting::Imperial)),
            ("set STOPS Continuous", Setting::Stops(StopFormatting::Continuous)),
            ("set round_ceiling on", Setting::RoundCeiling(true)),
            ("set recalc_all off", Setting::RecalcAll(false)),
        ];
        for (text, expected) in cases {
            assert_eq!(parse_line(text), Ok(Command::Set(expected)), "{text}");
        }
    }

    #[test]
    fn test_parse_closed_circuit_and_hold() {
        assert!(parse_line("gas tx/35 ccr 1.3 21 35").is_err());
        assert_eq!(
            parse_line("gas tx21.35 ccr 1.3 21 35"),
            Ok(Command::Gas {
                name: "tx21.35".to_string(),
                spec: GasSpec::ClosedCircuit {
                    setpoint: 1.3,
                    o2: 21.0,
                    he: 35.0,
                },
            })
        );
        assert_eq!(
            parse_line("hold 6 for 2.5 on ean50"),
            Ok(Command::Hold {
                depth: 6.0,
                minutes: 2.5,
                gas: "ean50".to_string(),
            })
        );
    }

    #[test]
    fn test_parse_errors_carry_line_numbers() {
        let err = parse_script("set gf 50 85\ndescend 20\n").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 2, .. }));

        let err = parse_script("report\nhold 20 for on air").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 2, .. }));

        let err = parse_script("report now").unwrap_err();
        assert!(matches!(err, ScriptError::Parse { line: 1, .. }));

        assert!(parse_script("set gf 50 300").is_err());
    }

    #[test]
    fn test_run_canonical() {
        let reports = run_script(CANONICAL).unwrap();
        assert_eq!(reports.len(), 2);

        let first = &reports[0];
        assert_eq!(first.depth_m, 20.0);
        assert_eq!(first.ceiling_m, 0.0);
        assert!(first.ndl_sec.unwrap() > 0.0);

        let second = &reports[1];
        assert!(second.ceiling_m > 0.0);
        assert!(second.deco.success);
        let table = second.deco.table.as_ref().unwrap();
        assert_eq!(table.stages.last().unwrap().end_depth_m, 0.0);
    }

    #[test]
    fn test_unknown_gas() {
        let err = run_script("gas air oc 21 0\nhold 10 for 5 on nitrox").unwrap_err();
        assert_eq!(
            err,
            ScriptError::UnknownGas {
                line: 2,
                name: "nitrox".to_string(),
            }
        );
    }

    #[test]
    fn test_setting_after_start() {
        let err = run_script("gas air oc 21 0\nset gf 30 70").unwrap_err();
        assert_eq!(err, ScriptError::SettingAfterStart { line: 2 });
    }

    #[test]
    fn test_engine_errors_are_wrapped() {
        let err = run_script("set gf 90 30\ngas air oc 21 0").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Engine {
                line: 2,
                source: DecoError::InvalidConfig(_)
            }
        ));

        let script = "set max_ppo2 1.4\ngas ean50 oc 50 0\nhold 30 for 5 on ean50";
        let err = run_script(script).unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Engine {
                line: 3,
                source: DecoError::ToxicityExceeded { .. }
            }
        ));

        let err = run_script("gas bad oc 80 40").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::Engine {
                line: 1,
                source: DecoError::InvalidGas(_)
            }
        ));
    }
}
