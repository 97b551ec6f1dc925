//! Everything the analyzers learn about the user equipment while walking a
//! capture. One [UeContext] belongs to exactly one analysis run.

use std::collections::BTreeMap;

use log::{debug, info};
use serde::Serialize;

use super::analyzer::{AnalysisError, Trace};
use crate::message::Message;
use crate::profile::SimProfile;
use crate::protocol::{IdentityType, SecurityAlgorithm};
use crate::vector::AuthVector;

const M_TMSI_FIELD: &str = "nas_eps.emm.m_tmsi";

/// Field name fragments identifying UE security capability bits.
const CAPABILITY_FRAGMENTS: &[&str] = &["eea", "eia", "uea", "uia", ".gea"];

/// Positions of noteworthy messages, used for ordering checks across
/// procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Landmark {
    AttachRequest,
    ConnectionSetupComplete,
    ConnectionReconfiguration,
    IdentityRequest,
    AuthenticationRequest,
    AuthenticationResponse,
    AuthenticationReject,
    AuthenticationFailure,
    NasSecurityModeCommand,
    NasSecurityModeComplete,
    NasSecurityModeReject,
    RrcSecurityModeCommand,
    RrcSecurityModeComplete,
    RrcSecurityModeFailure,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Landmarks(BTreeMap<Landmark, usize>);

impl Landmarks {
    /// Records `id` for `landmark`, replacing an earlier occurrence.
    pub fn record(&mut self, landmark: Landmark, id: usize) {
        self.0.insert(landmark, id);
    }

    pub fn get(&self, landmark: Landmark) -> Option<usize> {
        self.0.get(&landmark).copied()
    }
}

/// Capability bits from the attach request, keyed by algorithm name
/// (`eea0`, `128eia2`, `uea1`, `gea3`, ...). Values are the flag as shown
/// by the dissector, `"1"` for supported and `"0"` for not supported.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SecurityCapabilities(BTreeMap<String, String>);

impl SecurityCapabilities {
    /// Collects every capability field of `msg`, keyed by the last
    /// component of the field name.
    pub fn from_message(msg: &Message) -> Self {
        SecurityCapabilities(
            msg.fields()
                .iter()
                .filter(|(name, _)| CAPABILITY_FRAGMENTS.iter().any(|f| name.contains(f)))
                .map(|(name, value)| (trailing_component(name).to_string(), value.to_string()))
                .collect(),
        )
    }

    /// The subset of `msg`'s fields whose trailing name is one of our keys.
    pub fn reported_by(&self, msg: &Message) -> Self {
        SecurityCapabilities(
            msg.fields()
                .iter()
                .map(|(name, value)| (trailing_component(name), value))
                .filter(|(key, _)| self.0.contains_key(*key))
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// `Some(false)` only when the UE explicitly reported the algorithm as
    /// unsupported.
    pub fn supports(&self, algorithm: &SecurityAlgorithm) -> Option<bool> {
        self.get(&algorithm.capability_key()).map(|flag| flag.trim() != "0")
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

fn trailing_component(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChosenAlgorithms {
    #[serde(serialize_with = "serialize_algorithm")]
    pub nas_ciphering: Option<SecurityAlgorithm>,
    #[serde(serialize_with = "serialize_algorithm")]
    pub nas_integrity: Option<SecurityAlgorithm>,
    #[serde(serialize_with = "serialize_algorithm")]
    pub rrc_ciphering: Option<SecurityAlgorithm>,
    #[serde(serialize_with = "serialize_algorithm")]
    pub rrc_integrity: Option<SecurityAlgorithm>,
}

fn serialize_algorithm<S: serde::Serializer>(
    algorithm: &Option<SecurityAlgorithm>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match algorithm {
        Some(algorithm) => serializer.serialize_some(&algorithm.capability_key()),
        None => serializer.serialize_none(),
    }
}

/// State of the authentication currently in progress. Reset by every
/// authentication request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuthenticationState {
    pub rand: Option<Vec<u8>>,
    pub autn: Option<Vec<u8>>,
    pub xres: Option<Vec<u8>>,
    /// Whether the network's MAC matched the recomputed XMAC
    pub mac_passed: Option<bool>,
    /// Whether the UE's RES matched XRES
    pub passed: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionKeys {
    pub ck: Vec<u8>,
    pub ik: Vec<u8>,
    pub ak: Vec<u8>,
}

impl From<&AuthVector> for SessionKeys {
    fn from(vector: &AuthVector) -> Self {
        SessionKeys {
            ck: vector.ck.clone(),
            ik: vector.ik.clone(),
            ak: vector.ak.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UeContext {
    pub m_tmsi: Option<String>,
    pub security_capabilities: SecurityCapabilities,
    pub chosen: ChosenAlgorithms,
    pub authentication: AuthenticationState,
    pub keys: Option<SessionKeys>,
    pub landmarks: Landmarks,
    #[serde(skip)]
    pub identity_request_type: Option<IdentityType>,
    pub imsi: Option<String>,
    #[serde(skip)]
    pub sim_profile: Option<SimProfile>,
}

impl UeContext {
    pub fn new(sim_profile: Option<SimProfile>) -> Self {
        UeContext {
            sim_profile,
            ..Default::default()
        }
    }

    /// Seeds the context from the attach request, the only baseline of what
    /// the UE claims to support.
    pub fn initialize(&mut self, trace: &Trace) -> Result<(), AnalysisError> {
        let request = trace
            .messages()
            .iter()
            .find(|msg| msg.summary().contains("Attach request"))
            .ok_or(AnalysisError::MissingUserEquipmentInfo)?;

        self.m_tmsi = request.get(M_TMSI_FIELD).map(str::to_string);
        self.security_capabilities = SecurityCapabilities::from_message(request);
        self.landmarks.record(Landmark::AttachRequest, request.id());
        info!(
            "UE context from attach request #{}: {} security capabilities, M-TMSI {:?}",
            request.id(),
            self.security_capabilities.len(),
            self.m_tmsi
        );
        debug!("security capabilities: {:?}", self.security_capabilities);
        Ok(())
    }
}
