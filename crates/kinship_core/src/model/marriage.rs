//! Legacy marriage edge, kept for installations not yet on the union model.

use crate::model::member::MemberId;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type MarriageId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MarriageStatus {
    #[default]
    Active,
    Divorced,
    Widowed,
}

impl MarriageStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Divorced => "Divorced",
            Self::Widowed => "Widowed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Active" => Some(Self::Active),
            "Divorced" => Some(Self::Divorced),
            "Widowed" => Some(Self::Widowed),
            _ => None,
        }
    }
}

/// Ordered (husband, wife) edge. The husband role is always the male party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marriage {
    pub uuid: MarriageId,
    pub husband_id: MemberId,
    pub wife_id: MemberId,
    /// Epoch milliseconds.
    pub marriage_date: Option<i64>,
    pub status: MarriageStatus,
}

impl Marriage {
    pub fn new(husband_id: MemberId, wife_id: MemberId) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            husband_id,
            wife_id,
            marriage_date: None,
            status: MarriageStatus::Active,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.husband_id == self.wife_id {
            return Err(ValidationError::SelfPairing(self.husband_id));
        }
        Ok(())
    }
}
