//! Typed views over the dissector fields the analyzers dispatch on.
//!
//! Field values arrive as the strings a Wireshark-style dissector shows, so
//! every accessor here parses leniently and yields `None` for anything it
//! cannot make sense of.

use std::fmt;

use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

use crate::message::Message;

pub const EMM_TYPE_FIELD: &str = "nas_eps.nas_msg_emm_type";
pub const NAS_SECURITY_HEADER_FIELD: &str = "nas_eps.security_header_type";
pub const RLC_MODE_FIELD: &str = "rlc-lte.mode";
pub const RLC_CHANNEL_TYPE_FIELD: &str = "rlc-lte.channel-type";
pub const RLC_CHANNEL_ID_FIELD: &str = "rlc-lte.channel-id";
pub const PDCP_CIPHERING_FIELD: &str = "pdcp-lte.security-config.ciphering";
pub const PDCP_INTEGRITY_FIELD: &str = "pdcp-lte.security-config.integrity";

/// EPS mobility management message types, 3GPP TS 24.301 table 9.8.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum EmmMessageType {
    AttachRequest = 0x41,
    AttachAccept = 0x42,
    AttachComplete = 0x43,
    AttachReject = 0x44,
    DetachRequest = 0x45,
    DetachAccept = 0x46,
    TrackingAreaUpdateRequest = 0x48,
    TrackingAreaUpdateAccept = 0x49,
    TrackingAreaUpdateComplete = 0x4a,
    TrackingAreaUpdateReject = 0x4b,
    ExtendedServiceRequest = 0x4c,
    ServiceReject = 0x4e,
    GutiReallocationCommand = 0x50,
    GutiReallocationComplete = 0x51,
    AuthenticationRequest = 0x52,
    AuthenticationResponse = 0x53,
    AuthenticationReject = 0x54,
    IdentityRequest = 0x55,
    IdentityResponse = 0x56,
    AuthenticationFailure = 0x5c,
    SecurityModeCommand = 0x5d,
    SecurityModeComplete = 0x5e,
    SecurityModeReject = 0x5f,
    EmmStatus = 0x60,
    EmmInformation = 0x61,
    DownlinkNasTransport = 0x62,
    UplinkNasTransport = 0x63,
    CsServiceNotification = 0x64,
}

impl EmmMessageType {
    /// Reads the EMM message type of `msg`, if it carries one.
    pub fn of(msg: &Message) -> Option<Self> {
        let value = parse_u8(msg.get(EMM_TYPE_FIELD)?)?;
        Self::try_from(value).ok()
    }
}

/// Presence-detected RRC elements. The dissector exposes them as
/// `lte-rrc.<name>_element` fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RrcElement {
    SecurityModeCommand,
    SecurityModeComplete,
    SecurityModeFailure,
    ConnectionSetupComplete,
    ConnectionReconfiguration,
    SrbToAddMod,
}

impl RrcElement {
    pub fn field_name(&self) -> &'static str {
        match self {
            RrcElement::SecurityModeCommand => "lte-rrc.securityModeCommand_element",
            RrcElement::SecurityModeComplete => "lte-rrc.securityModeComplete_element",
            RrcElement::SecurityModeFailure => "lte-rrc.securityModeFailure_element",
            RrcElement::ConnectionSetupComplete => "lte-rrc.rrcConnectionSetupComplete_element",
            RrcElement::ConnectionReconfiguration => {
                "lte-rrc.rrcConnectionReconfiguration_element"
            }
            RrcElement::SrbToAddMod => "lte-rrc.SRB_ToAddMod_element",
        }
    }

    pub fn is_present(&self, msg: &Message) -> bool {
        msg.has_field(self.field_name())
    }
}

/// Identity type 2 (TS 24.301 9.9.3.17) and mobile identity type
/// (TS 24.008 10.5.1.4) share their lower codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, FromPrimitive)]
#[repr(u8)]
pub enum IdentityType {
    Imsi = 1,
    Imei = 2,
    Imeisv = 3,
    Tmsi = 4,
    Guti = 6,
    #[num_enum(catch_all)]
    Other(u8),
}

impl IdentityType {
    pub fn parse(value: &str) -> Option<Self> {
        parse_u8(value).map(Self::from)
    }
}

impl fmt::Display for IdentityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityType::Imsi => f.write_str("IMSI"),
            IdentityType::Imei => f.write_str("IMEI"),
            IdentityType::Imeisv => f.write_str("IMEISV"),
            IdentityType::Tmsi => f.write_str("TMSI"),
            IdentityType::Guti => f.write_str("GUTI"),
            IdentityType::Other(code) => write!(f, "identity type {code}"),
        }
    }
}

/// RLC transfer mode as reported by the RLC dissector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum RlcMode {
    Transparent = 1,
    Unacknowledged = 2,
    Acknowledged = 4,
}

impl RlcMode {
    pub fn of(msg: &Message) -> Option<Self> {
        Self::try_from(parse_u8(msg.get(RLC_MODE_FIELD)?)?).ok()
    }
}

/// Logical channel type carried in the RLC context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, IntoPrimitive, TryFromPrimitive)]
#[repr(u8)]
pub enum ChannelType {
    Ccch = 1,
    BcchBch = 2,
    Pcch = 3,
    Srb = 4,
    Drb = 5,
    BcchDlSch = 6,
    Mcch = 7,
    Mtch = 8,
}

impl ChannelType {
    pub fn of(msg: &Message) -> Option<Self> {
        Self::try_from(parse_u8(msg.get(RLC_CHANNEL_TYPE_FIELD)?)?).ok()
    }
}

/// Radio bearer a message was carried on, if the RLC context is known.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bearer {
    pub channel_type: ChannelType,
    pub id: Option<u8>,
}

impl Bearer {
    pub fn of(msg: &Message) -> Option<Self> {
        Some(Bearer {
            channel_type: ChannelType::of(msg)?,
            id: msg.get(RLC_CHANNEL_ID_FIELD).and_then(parse_u8),
        })
    }
}

/// Whether the NAS part of `msg` is ciphered, judged from its security header.
pub fn is_nas_ciphered(msg: &Message) -> bool {
    matches!(msg.get(NAS_SECURITY_HEADER_FIELD).and_then(parse_u8), Some(2 | 4))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgorithmFamily {
    Ciphering,
    Integrity,
}

/// An EPS security algorithm, e.g. EEA2 or EIA0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecurityAlgorithm {
    pub family: AlgorithmFamily,
    pub id: u8,
}

impl SecurityAlgorithm {
    pub fn ciphering(id: u8) -> Self {
        Self {
            family: AlgorithmFamily::Ciphering,
            id,
        }
    }

    pub fn integrity(id: u8) -> Self {
        Self {
            family: AlgorithmFamily::Integrity,
            id,
        }
    }

    /// Parses a field value such as `2`, `eea2` or `128-EEA2`; the trailing
    /// digits are the algorithm number.
    pub fn parse(family: AlgorithmFamily, value: &str) -> Option<Self> {
        let value = value.trim();
        let digits_start = value
            .char_indices()
            .rev()
            .take_while(|(_, c)| c.is_ascii_digit())
            .last()
            .map(|(i, _)| i)?;
        let id = value[digits_start..].parse().ok()?;
        Some(Self { family, id })
    }

    pub fn is_null(&self) -> bool {
        self.id == 0
    }

    /// Name used as key in the UE security capabilities, with the `128`
    /// prefix the dissector puts on the AES and SNOW based algorithms.
    pub fn capability_key(&self) -> String {
        let prefix = match self.id {
            1 | 2 => "128",
            _ => "",
        };
        let family = match self.family {
            AlgorithmFamily::Ciphering => "eea",
            AlgorithmFamily::Integrity => "eia",
        };
        format!("{prefix}{family}{}", self.id)
    }
}

impl fmt::Display for SecurityAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.capability_key())
    }
}

/// Parses a small integer shown either in decimal or `0x` hex.
pub fn parse_u8(value: &str) -> Option<u8> {
    let value = value.trim();
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emm_type_from_decimal_and_hex() {
        let msg = Message::new(0, "Authentication request").with_field(EMM_TYPE_FIELD, "82");
        assert_eq!(EmmMessageType::of(&msg), Some(EmmMessageType::AuthenticationRequest));
        let msg = Message::new(0, "Security mode command").with_field(EMM_TYPE_FIELD, "0x5d");
        assert_eq!(EmmMessageType::of(&msg), Some(EmmMessageType::SecurityModeCommand));
        let msg = Message::new(0, "garbage").with_field(EMM_TYPE_FIELD, "banana");
        assert_eq!(EmmMessageType::of(&msg), None);
    }

    #[test]
    fn test_algorithm_capability_keys() {
        assert_eq!(SecurityAlgorithm::ciphering(0).capability_key(), "eea0");
        assert_eq!(SecurityAlgorithm::ciphering(1).capability_key(), "128eea1");
        assert_eq!(SecurityAlgorithm::integrity(2).capability_key(), "128eia2");
        assert_eq!(SecurityAlgorithm::integrity(3).capability_key(), "eia3");
    }

    #[test]
    fn test_algorithm_parse() {
        let family = AlgorithmFamily::Ciphering;
        assert_eq!(SecurityAlgorithm::parse(family, "2"), Some(SecurityAlgorithm::ciphering(2)));
        assert_eq!(SecurityAlgorithm::parse(family, "eea0"), Some(SecurityAlgorithm::ciphering(0)));
        assert_eq!(
            SecurityAlgorithm::parse(family, "128-EEA1"),
            Some(SecurityAlgorithm::ciphering(1))
        );
        assert_eq!(SecurityAlgorithm::parse(family, "none"), None);
        assert_eq!(SecurityAlgorithm::parse(family, ""), None);
    }

    #[test]
    fn test_identity_type_catch_all() {
        assert_eq!(IdentityType::parse("1"), Some(IdentityType::Imsi));
        assert_eq!(IdentityType::parse("7"), Some(IdentityType::Other(7)));
        assert_eq!(IdentityType::parse("x"), None);
    }

    #[test]
    fn test_bearer_requires_channel_type() {
        let msg = Message::new(0, "ULInformationTransfer")
            .with_field(RLC_CHANNEL_TYPE_FIELD, "4")
            .with_field(RLC_CHANNEL_ID_FIELD, "2");
        assert_eq!(
            Bearer::of(&msg),
            Some(Bearer {
                channel_type: ChannelType::Srb,
                id: Some(2)
            })
        );
        assert_eq!(Bearer::of(&Message::new(1, "no rlc")), None);
    }
}
