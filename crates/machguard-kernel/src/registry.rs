//! [`ParameterRegistry`] – natural-language aliases for telemetry fields.
//!
//! Maps every phrase an operator may use for a machine parameter ("rpm",
//! "spindle speed", "fire suppression", …) onto the [`StateField`] it
//! addresses, its unit, the axis it belongs to and, for physically coupled
//! parameters, the [`PhysicalQuantity`] the predictor interpolates on.

use machguard_types::{GuardError, StateField};

use crate::predictor::PhysicalQuantity;

/// Which spindle axis a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    Primary,
    Secondary,
}

impl Axis {
    pub fn speed_field(self) -> StateField {
        match self {
            Axis::Primary => StateField::SpindleSpeed,
            Axis::Secondary => StateField::Axis2Speed,
        }
    }

    pub fn temperature_field(self) -> StateField {
        match self {
            Axis::Primary => StateField::SpindleTemp,
            Axis::Secondary => StateField::Axis2Temp,
        }
    }

    pub fn torque_field(self) -> StateField {
        match self {
            Axis::Primary => StateField::SpindleTorque,
            Axis::Secondary => StateField::Axis2Torque,
        }
    }
}

/// Static description of one addressable parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParameterSpec {
    /// Canonical key emitted by the normalizer.
    pub key: &'static str,
    /// Lower-case phrases that refer to this parameter.
    pub aliases: &'static [&'static str],
    pub field: StateField,
    pub unit: &'static str,
    pub axis: Axis,
    /// Set for the physically coupled set (speed, voltage, pressure, torque,
    /// temperature, power).
    pub physical: Option<PhysicalQuantity>,
}

impl ParameterSpec {
    pub fn is_coupled(&self) -> bool {
        self.physical.is_some()
    }
}

const fn spec(
    key: &'static str,
    aliases: &'static [&'static str],
    field: StateField,
    unit: &'static str,
    axis: Axis,
    physical: Option<PhysicalQuantity>,
) -> ParameterSpec {
    ParameterSpec {
        key,
        aliases,
        field,
        unit,
        axis,
        physical,
    }
}

static BUILTIN: &[ParameterSpec] = &[
    spec(
        "rpm",
        &["rpm", "speed", "spindle speed", "spindle", "rotation", "rotational speed", "motor speed"],
        StateField::SpindleSpeed,
        "rpm",
        Axis::Primary,
        Some(PhysicalQuantity::Speed),
    ),
    spec(
        "temperature",
        &["temperature", "temp", "spindle temperature", "motor temperature"],
        StateField::SpindleTemp,
        "°C",
        Axis::Primary,
        Some(PhysicalQuantity::Temperature),
    ),
    spec(
        "torque",
        &["torque", "spindle torque"],
        StateField::SpindleTorque,
        "Nm",
        Axis::Primary,
        Some(PhysicalQuantity::Torque),
    ),
    spec(
        "axis2_rpm",
        &["axis2 rpm", "axis2 speed", "axis2", "secondary rpm", "secondary speed", "secondary axis"],
        StateField::Axis2Speed,
        "rpm",
        Axis::Secondary,
        Some(PhysicalQuantity::Speed),
    ),
    spec(
        "axis2_temperature",
        &["axis2 temperature", "axis2 temp", "secondary temperature"],
        StateField::Axis2Temp,
        "°C",
        Axis::Secondary,
        Some(PhysicalQuantity::Temperature),
    ),
    spec(
        "axis2_torque",
        &["axis2 torque", "secondary torque"],
        StateField::Axis2Torque,
        "Nm",
        Axis::Secondary,
        Some(PhysicalQuantity::Torque),
    ),
    spec(
        "pressure",
        &["pressure", "hydraulic pressure", "hydraulics"],
        StateField::HydraulicPressure,
        "bar",
        Axis::Primary,
        Some(PhysicalQuantity::Pressure),
    ),
    spec(
        "voltage",
        &["voltage", "bus voltage", "volts"],
        StateField::BusVoltage,
        "V",
        Axis::Primary,
        Some(PhysicalQuantity::Voltage),
    ),
    spec(
        "power",
        &["power", "power draw", "power output"],
        StateField::PowerDraw,
        "kW",
        Axis::Primary,
        Some(PhysicalQuantity::Power),
    ),
    spec(
        "coolant_flow",
        &["coolant flow", "coolant rate", "flow"],
        StateField::CoolantFlow,
        "l/min",
        Axis::Primary,
        None,
    ),
    spec(
        "jitter",
        &["jitter", "network jitter", "latency"],
        StateField::NetworkJitter,
        "ms",
        Axis::Primary,
        None,
    ),
    spec(
        "controller_load",
        &["controller load", "cpu load", "plc load"],
        StateField::ControllerLoad,
        "%",
        Axis::Primary,
        None,
    ),
    spec(
        "sprinkler",
        &["sprinkler", "sprinklers", "fire suppression", "suppression"],
        StateField::Sprinkler,
        "bool",
        Axis::Primary,
        None,
    ),
    spec(
        "ventilation",
        &["ventilation", "ventilation fan", "exhaust fan", "fan", "fans"],
        StateField::Ventilation,
        "bool",
        Axis::Primary,
        None,
    ),
    spec(
        "igniter",
        &["igniter", "ignition", "spark", "pilot flame", "torch"],
        StateField::Igniter,
        "bool",
        Axis::Primary,
        None,
    ),
    spec(
        "coolant_pump",
        &["coolant pump", "pump"],
        StateField::CoolantPump,
        "bool",
        Axis::Primary,
        None,
    ),
    spec(
        "estop",
        &["estop", "e-stop", "emergency stop", "emergency brake"],
        StateField::EmergencyStop,
        "bool",
        Axis::Primary,
        None,
    ),
];

/// A match of a registry alias inside free text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AliasMatch {
    pub spec: &'static ParameterSpec,
    pub start: usize,
    pub end: usize,
}

/// Lookup table from phrases to [`ParameterSpec`]s.
///
/// # Example
///
/// ```
/// use machguard_kernel::registry::ParameterRegistry;
/// use machguard_types::StateField;
///
/// let registry = ParameterRegistry::builtin();
/// assert_eq!(registry.resolve("RPM").unwrap().field, StateField::SpindleSpeed);
/// assert_eq!(registry.resolve("fire_suppression").unwrap().key, "sprinkler");
/// assert!(registry.resolve("warp_drive").is_none());
/// ```
#[derive(Debug, Clone, Copy)]
pub struct ParameterRegistry {
    specs: &'static [ParameterSpec],
}

impl Default for ParameterRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ParameterRegistry {
    /// The built-in machine parameter table.
    pub fn builtin() -> Self {
        Self { specs: BUILTIN }
    }

    pub fn iter(&self) -> impl Iterator<Item = &'static ParameterSpec> {
        self.specs.iter()
    }

    /// Resolve a single token or phrase.  Matches the canonical key, any
    /// alias, or the backing state field name; underscores and spaces are
    /// interchangeable and case is ignored.
    pub fn resolve(&self, name: &str) -> Option<&'static ParameterSpec> {
        let wanted = name.trim().to_lowercase().replace('_', " ");
        if wanted.is_empty() {
            return None;
        }
        self.specs.iter().find(|s| {
            s.key.replace('_', " ") == wanted
                || s.field.name().replace('_', " ") == wanted
                || s.aliases.iter().any(|a| *a == wanted)
        })
    }

    /// [`resolve`](Self::resolve), failing with
    /// [`GuardError::UnknownParameter`] when nothing matches.
    pub fn lookup(&self, name: &str) -> Result<&'static ParameterSpec, GuardError> {
        self.resolve(name)
            .ok_or_else(|| GuardError::UnknownParameter(name.to_string()))
    }

    /// Every alias occurrence in `text` (which must already be lower-case),
    /// on word boundaries.
    pub fn matches_in(&self, text: &str) -> Vec<AliasMatch> {
        let mut found = Vec::new();
        for spec in self.specs {
            for alias in spec.aliases.iter().copied().chain(std::iter::once(spec.key)) {
                for (start, end) in find_words(text, alias) {
                    found.push(AliasMatch { spec, start, end });
                }
            }
        }
        found
    }
}

/// Pick the earliest match, preferring the longest at equal offsets.
pub(crate) fn earliest(mut matches: Vec<AliasMatch>) -> Option<AliasMatch> {
    matches.sort_by(|a, b| a.start.cmp(&b.start).then((b.end - b.start).cmp(&(a.end - a.start))));
    matches.into_iter().next()
}

/// All byte ranges where `needle` occurs in `haystack` on word boundaries.
pub(crate) fn find_words(haystack: &str, needle: &str) -> Vec<(usize, usize)> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let mut out = Vec::new();
    if needle.is_empty() {
        return out;
    }
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let before_ok = haystack[..start].chars().next_back().is_none_or(|c| !is_word(c));
        let after_ok = haystack[end..].chars().next().is_none_or(|c| !is_word(c));
        if before_ok && after_ok {
            out.push((start, end));
        }
        from = start + haystack[start..].chars().next().map_or(1, char::len_utf8);
    }
    out
}
