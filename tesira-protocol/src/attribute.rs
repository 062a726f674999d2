//! Attribute codes and the command formatting policy table
//!
//! Every attribute the client can address has exactly one [`FormatRule`]. The
//! rule decides where indices go, whether a verb is written, and whether the
//! command is addressed to a block instance tag or to the device itself. New
//! attribute quirks are added here and nowhere else.

pub const LEVEL: &str = "level";
pub const MUTE: &str = "mute";
pub const MIN_LEVEL: &str = "minLevel";
pub const MAX_LEVEL: &str = "maxLevel";
pub const STATE: &str = "state";
pub const INPUT: &str = "input";
pub const SOURCE_SELECTION: &str = "sourceSelection";
pub const CROSSPOINT_LEVEL_STATE: &str = "crosspointLevelState";
pub const CROSSPOINT_LEVEL: &str = "crosspointLevel";
pub const WALL_STATE: &str = "wallState";
pub const CALL_STATE: &str = "callState";
pub const AUTO_ANSWER: &str = "autoAnswer";

pub const DIAL: &str = "dial";
pub const END: &str = "end";
pub const ON_HOOK: &str = "onHook";
pub const OFF_HOOK: &str = "offHook";
pub const ANSWER: &str = "answer";

pub const SERIAL_NUMBER: &str = "serialNumber";
pub const VERSION: &str = "version";
pub const HOSTNAME: &str = "hostname";
pub const NETWORK_STATUS: &str = "networkStatus";
pub const DISCOVERED_SERVERS: &str = "discoveredServers";
pub const RECALL_PRESET: &str = "recallPreset";
pub const RECALL_PRESET_BY_NAME: &str = "recallPresetByName";

/// Literal tag used for device-scope commands
pub const DEVICE_TAG: &str = "DEVICE";

/// How a command for an attribute is laid out on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FormatRule {
    /// `"<tag>" <verb> <attr> [<value>]`, block-level attribute without an index
    Standard,
    /// `"<tag>" <verb> <attr> <index> [<value>]`, index always written
    Indexed,
    /// `"<tag>" <verb> <attr> <index1> <index2> [<value>]`
    DualIndex,
    /// `"<tag>" <attr> <index1> <index2> [<value>]`, no verb
    DualIndexAction,
    /// `DEVICE <verb> <attr> [<value>]`
    Device,
    /// `DEVICE <attr> [<value>]`, no verb
    DeviceAction,
}

impl FormatRule {
    /// Whether the command is addressed to the device rather than a block
    pub fn is_device_scope(self) -> bool {
        matches!(self, FormatRule::Device | FormatRule::DeviceAction)
    }

    /// Whether the verb is omitted from the command
    pub fn omits_verb(self) -> bool {
        matches!(self, FormatRule::DualIndexAction | FormatRule::DeviceAction)
    }
}

const FORMAT_TABLE: &[(&str, FormatRule)] = &[
    (LEVEL, FormatRule::Indexed),
    (MUTE, FormatRule::Indexed),
    (MIN_LEVEL, FormatRule::Indexed),
    (MAX_LEVEL, FormatRule::Indexed),
    (STATE, FormatRule::Indexed),
    (INPUT, FormatRule::Indexed),
    (WALL_STATE, FormatRule::Indexed),
    (AUTO_ANSWER, FormatRule::Indexed),
    (SOURCE_SELECTION, FormatRule::Standard),
    (CALL_STATE, FormatRule::Standard),
    (CROSSPOINT_LEVEL_STATE, FormatRule::DualIndex),
    (CROSSPOINT_LEVEL, FormatRule::DualIndex),
    (DIAL, FormatRule::DualIndexAction),
    (END, FormatRule::DualIndexAction),
    (ON_HOOK, FormatRule::DualIndexAction),
    (OFF_HOOK, FormatRule::DualIndexAction),
    (ANSWER, FormatRule::DualIndexAction),
    (SERIAL_NUMBER, FormatRule::Device),
    (VERSION, FormatRule::Device),
    (HOSTNAME, FormatRule::Device),
    (NETWORK_STATUS, FormatRule::Device),
    (DISCOVERED_SERVERS, FormatRule::Device),
    (RECALL_PRESET, FormatRule::DeviceAction),
    (RECALL_PRESET_BY_NAME, FormatRule::DeviceAction),
];

/// Look up the formatting rule for an attribute code
///
/// Attributes missing from the table use [`FormatRule::Standard`].
pub fn format_rule(attribute: &str) -> FormatRule {
    FORMAT_TABLE
        .iter()
        .find(|(code, _)| *code == attribute)
        .map(|(_, rule)| *rule)
        .unwrap_or(FormatRule::Standard)
}

/// All attribute codes with an explicit rule
pub fn known_attributes() -> impl Iterator<Item = &'static str> {
    FORMAT_TABLE.iter().map(|(code, _)| *code)
}
