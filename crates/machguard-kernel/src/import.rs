//! Batch telemetry import.
//!
//! Parses tabular key/value text (CSV exports, `key=value` dumps, tab
//! separated sheets) into a [`TelemetryPatch`].  Keys resolve through the
//! [`ParameterRegistry`], so `rpm`, `spindle_speed_rpm` and `spindle speed`
//! all land on the same field.  `hazard`/`hazard_detected` and `health` set
//! the advisory classifications.
//!
//! ```text
//! # exported 2026-03-02
//! key,value
//! rpm,1200
//! coolant flow,8.5
//! sprinkler,off
//! hazard_detected,FIRE
//! ```

use machguard_types::{GuardError, HazardKind, HealthStatus, StateField, TelemetryState};

use crate::registry::ParameterRegistry;

/// A partial telemetry reading.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetryPatch {
    pub values: Vec<(StateField, f64)>,
    pub hazard: Option<HazardKind>,
    pub health: Option<HealthStatus>,
}

impl TelemetryPatch {
    /// Number of entries the patch will write.
    pub fn len(&self) -> usize {
        self.values.len() + usize::from(self.hazard.is_some()) + usize::from(self.health.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every patched value into `state`.
    pub fn apply_to(&self, state: &mut TelemetryState) {
        for (field, value) in &self.values {
            state.set(*field, *value);
        }
        if let Some(hazard) = self.hazard {
            state.hazard_detected = hazard;
        }
        if let Some(health) = self.health {
            state.health = health;
        }
    }
}

/// Parse `text` into a patch.  Line numbers in errors are 1-based.
pub fn parse_batch(text: &str, registry: &ParameterRegistry) -> Result<TelemetryPatch, GuardError> {
    let mut patch = TelemetryPatch::default();
    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once([',', '=', ':', '\t']) else {
            return Err(import_error(line_no, format!("no separator in '{line}'")));
        };
        let key = key.trim().trim_matches('"');
        let value = value.trim().trim_matches('"');

        if key.eq_ignore_ascii_case("key") || key.eq_ignore_ascii_case("parameter") {
            continue;
        }
        match key.to_lowercase().as_str() {
            "hazard" | "hazard_detected" => {
                let hazard = HazardKind::parse(value)
                    .ok_or_else(|| import_error(line_no, format!("unknown hazard '{value}'")))?;
                patch.hazard = Some(hazard);
            }
            "health" => {
                let health = HealthStatus::parse(value)
                    .ok_or_else(|| import_error(line_no, format!("unknown health '{value}'")))?;
                patch.health = Some(health);
            }
            _ => {
                let spec = registry
                    .resolve(key)
                    .ok_or_else(|| import_error(line_no, format!("unknown parameter '{key}'")))?;
                let number = if spec.field.is_switch() {
                    parse_switch(value)
                } else {
                    value.parse::<f64>().ok().filter(|v| v.is_finite())
                }
                .ok_or_else(|| import_error(line_no, format!("bad value '{value}' for {key}")))?;
                patch.values.push((spec.field, number));
            }
        }
    }
    Ok(patch)
}

fn parse_switch(value: &str) -> Option<f64> {
    match value.to_lowercase().as_str() {
        "on" | "true" | "yes" | "armed" | "engaged" => Some(1.0),
        "off" | "false" | "no" | "disarmed" | "released" => Some(0.0),
        other => other.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

fn import_error(line: usize, details: String) -> GuardError {
    GuardError::Import { line, details }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<TelemetryPatch, GuardError> {
        parse_batch(text, &ParameterRegistry::builtin())
    }

    #[test]
    fn parses_mixed_separators_and_aliases() {
        let patch = parse(
            "# plant export\nkey,value\nrpm,1200\ncoolant flow = 8.5\nsprinkler:off\nhazard_detected\tFIRE\n",
        )
        .unwrap();
        assert_eq!(
            patch.values,
            vec![
                (StateField::SpindleSpeed, 1200.0),
                (StateField::CoolantFlow, 8.5),
                (StateField::Sprinkler, 0.0),
            ]
        );
        assert_eq!(patch.hazard, Some(HazardKind::Fire));
        assert_eq!(patch.len(), 4);
    }

    #[test]
    fn apply_writes_fields_and_flags() {
        let patch = parse("health,degraded\nigniter,on\nspindle_temp_c,64").unwrap();
        let mut state = TelemetryState::default();
        patch.apply_to(&mut state);
        assert_eq!(state.health, HealthStatus::Degraded);
        assert!(state.igniter_on);
        assert_eq!(state.spindle_temp_c, 64.0);
    }

    #[test]
    fn unknown_key_reports_line_number() {
        let err = parse("rpm,10\n\nwarp_core,3").unwrap_err();
        assert!(matches!(err, GuardError::Import { line: 3, .. }));
    }

    #[test]
    fn bad_value_is_an_error() {
        assert!(matches!(
            parse("voltage,lots").unwrap_err(),
            GuardError::Import { line: 1, .. }
        ));
        assert!(parse("hazard,volcano").is_err());
        assert!(parse("just some words").is_err());
    }

    #[test]
    fn empty_input_is_an_empty_patch() {
        assert!(parse("\n# nothing\n").unwrap().is_empty());
    }
}
