//! Versioned cores/RAM records per appliance.

use std::sync::Arc;

use crate::api::{ApplianceId, Specification};
use crate::commons::StratusResult;
use crate::commons::error::Error;
use crate::ledger::{TouchKind, TouchLedger, TouchPayload};

//------------ SpecificationHistory ------------------------------------------

/// Records and recalls the resource specification of appliances.
///
/// Specifications are ordinary touches, so "latest" and "n versions
/// back" are ledger queries. Like the rest of the core this layer does
/// not check that the appliance id refers to an existing appliance;
/// callers that need that guarantee resolve the id through the
/// directory first.
#[derive(Debug)]
pub struct SpecificationHistory {
    ledger: Arc<TouchLedger>,
}

impl SpecificationHistory {
    pub fn new(ledger: Arc<TouchLedger>) -> Self {
        SpecificationHistory { ledger }
    }

    /// Appends a specification touch.
    ///
    /// Both cores and RAM must be positive.
    pub fn add(
        &self,
        appliance: ApplianceId,
        cores: u32,
        ram: u32,
    ) -> StratusResult<u64> {
        if cores == 0 || ram == 0 {
            return Err(Error::InvalidSpecification { cores, ram });
        }

        let touch = self.ledger.append(
            appliance.into(),
            TouchPayload::SpecificationChange { cores, ram },
        )?;
        Ok(touch.sequence())
    }

    /// The most recently recorded specification.
    pub fn latest(
        &self,
        appliance: ApplianceId,
    ) -> StratusResult<Specification> {
        self.nth_back(appliance, 0)
    }

    /// The specification `n` versions before the latest.
    ///
    /// `n = 1` is the one immediately preceding the latest. Fails with
    /// [`Error::InsufficientHistory`] when the appliance has recorded
    /// fewer than `n + 1` specifications.
    pub fn previous(
        &self,
        appliance: ApplianceId,
        n: usize,
    ) -> StratusResult<Specification> {
        self.nth_back(appliance, n)
    }

    fn nth_back(
        &self,
        appliance: ApplianceId,
        n: usize,
    ) -> StratusResult<Specification> {
        self.ledger
            .nth_back(appliance.into(), TouchKind::Specification, n)?
            .and_then(|touch| touch.payload().specification())
            .map(|(cores, ram)| Specification { cores, ram })
            .ok_or(Error::NoSpecification(appliance))
    }
}


//------------ Tests ---------------------------------------------------------
