//! # eligibility
//!
//! why: tell the election algorithm whether this node may currently stand for office
//! relations: wrapped (always armed) by frame.rs
//! what: EligibilityCause, Eligibility

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::{self, Wire};
use crate::config::ClusterConfig;
use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EligibilityCause {
    Eligible,
    Ineligible,
}

impl EligibilityCause {
    pub fn code(self) -> i32 {
        match self {
            EligibilityCause::Eligible => 0,
            EligibilityCause::Ineligible => 1,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, DecodeError> {
        match code {
            0 => Ok(EligibilityCause::Eligible),
            1 => Ok(EligibilityCause::Ineligible),
            other => Err(DecodeError::InvalidCode {
                field: "eligibility cause",
                code: other.into(),
            }),
        }
    }
}

/// Local readiness event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Eligibility {
    cause: EligibilityCause,
}

impl Eligibility {
    pub fn new(cause: EligibilityCause) -> Self {
        Self { cause }
    }

    pub fn cause(&self) -> EligibilityCause {
        self.cause
    }
}

impl Wire for Eligibility {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_i32(self.cause.code());
    }

    fn decode<B: Buf>(buf: &mut B, _config: &ClusterConfig) -> Result<Self, DecodeError> {
        let cause = EligibilityCause::from_code(codec::get_i32(buf)?)?;
        Ok(Self { cause })
    }
}
