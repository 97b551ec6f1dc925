//! Subscriber (SIM) profiles used to recompute authentication vectors.
//!
//! Profiles come from an srsRAN style `user_db.csv`:
//!
//! ```text
//! # name,auth,imsi,key,op_type,op/opc,amf,sqn,qci,ip_alloc
//! ue1,mil,001010123456780,00112233445566778899aabbccddeeff,opc,63bfa50ee6523365ff14c1f45f88737d,8000,000000001234,7,dynamic
//! ```
//!
//! Only the first data row is used; the capture is assumed to belong to that
//! subscriber.

use std::io::Read;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{HexFieldError, decode_hex_field};

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("failed to read subscriber database: {0}")]
    Csv(#[from] csv::Error),
    #[error("subscriber database contains no entries")]
    Empty,
    #[error("subscriber entry has {0} columns, expected 10")]
    MissingColumns(usize),
    #[error("unknown authentication algorithm {0:?}, expected \"mil\" or \"xor\"")]
    UnknownAlgorithm(String),
    #[error("unknown operator key type {0:?}, expected \"op\" or \"opc\"")]
    UnknownOperatorKeyType(String),
    #[error("invalid {field}: {source}")]
    InvalidHex {
        field: &'static str,
        source: HexFieldError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthAlgorithm {
    /// 3GPP MILENAGE (TS 35.206)
    #[serde(rename = "mil")]
    Milenage,
    /// The XOR test algorithm from TS 34.108
    Xor,
}

impl AuthAlgorithm {
    pub fn parse(value: &str) -> Result<Self, ProfileError> {
        match value.trim() {
            "mil" => Ok(AuthAlgorithm::Milenage),
            "xor" => Ok(AuthAlgorithm::Xor),
            other => Err(ProfileError::UnknownAlgorithm(other.to_string())),
        }
    }
}

/// Operator variant key, stored either raw or already combined with K.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperatorKey {
    Op(Vec<u8>),
    Opc(Vec<u8>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimProfile {
    pub auth: Option<AuthAlgorithm>,
    pub imsi: Option<String>,
    pub key: Option<Vec<u8>>,
    pub operator_key: Option<OperatorKey>,
    pub amf: Option<Vec<u8>>,
    pub sqn: Option<String>,
    pub qci: Option<String>,
    pub ip_alloc: Option<String>,
}

impl SimProfile {
    /// Reads the first subscriber entry of a `user_db.csv` stream.
    pub fn from_user_db<R: Read>(reader: R) -> Result<Self, ProfileError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .comment(Some(b'#'))
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let record = reader.records().next().ok_or(ProfileError::Empty)??;
        Self::from_record(&record)
    }

    fn from_record(record: &csv::StringRecord) -> Result<Self, ProfileError> {
        if record.len() < 10 {
            return Err(ProfileError::MissingColumns(record.len()));
        }
        let hex_column = |index: usize, field: &'static str| {
            decode_hex_field(&record[index]).map_err(|source| ProfileError::InvalidHex { field, source })
        };
        let operator_value = hex_column(5, "op/opc")?;
        let operator_key = match &record[4] {
            "op" => OperatorKey::Op(operator_value),
            "opc" => OperatorKey::Opc(operator_value),
            other => return Err(ProfileError::UnknownOperatorKeyType(other.to_string())),
        };
        let profile = SimProfile {
            auth: Some(AuthAlgorithm::parse(&record[1])?),
            imsi: Some(record[2].to_string()),
            key: Some(hex_column(3, "key")?),
            operator_key: Some(operator_key),
            amf: Some(hex_column(6, "amf")?),
            sqn: Some(record[7].to_string()),
            qci: Some(record[8].to_string()),
            ip_alloc: Some(record[9].to_string()),
        };
        debug!("loaded subscriber profile for {}", &record[0]);
        Ok(profile)
    }
}
