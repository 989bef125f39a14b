//! The umbrella the adapter layer talks to.

use std::collections::BTreeSet;
use std::sync::Arc;

use log::info;

use crate::api::{
    AccountDetails, AccountId, ApplianceDetails, ApplianceId, CreditReceipt,
    JobStatus, Specification,
};
use crate::commons::StratusResult;
use crate::commons::error::Error;
use crate::config::Config;
use crate::credit::CreditLedger;
use crate::directory::{AccountDirectory, ApplianceDirectory};
use crate::jobs::{JobTracker, Operation};
use crate::ledger::{Touch, TouchLedger, TouchPayload};
use crate::registry::StateRegistry;
use crate::specs::SpecificationHistory;

//------------ StratusServer -------------------------------------------------

/// Wires all components together over one storage URI.
///
/// The adapter resolves request parameters to identifiers, calls
/// exactly one method here per request, and serializes the returned
/// record. Methods that reference accounts or appliances by id check
/// that the id exists before touching the ledger, so that an unknown id
/// surfaces as a not-found outcome rather than as orphaned history.
pub struct StratusServer {
    registry: Arc<StateRegistry>,
    ledger: Arc<TouchLedger>,
    appliances: ApplianceDirectory,
    accounts: AccountDirectory,
    specifications: SpecificationHistory,
    credit: CreditLedger,
    jobs: JobTracker,
}

impl StratusServer {
    /// Builds a server from its configuration.
    ///
    /// Registers the configured state list if this storage has none
    /// yet; an existing list is left untouched so that restarting a
    /// server is harmless.
    pub fn build(config: &Config) -> StratusResult<Self> {
        let storage_uri = &config.storage_uri;

        let ledger = Arc::new(TouchLedger::create(storage_uri)?);
        let registry = Arc::new(StateRegistry::create(storage_uri)?);

        if !config.states.is_empty() && !registry.is_registered()? {
            registry.register(&config.states)?;
            info!(
                "registered {} lifecycle states",
                config.states.len()
            );
        }

        let appliances = ApplianceDirectory::create(
            storage_uri,
            ledger.clone(),
            registry.clone(),
        )?;
        let accounts =
            AccountDirectory::create(storage_uri, ledger.clone())?;
        let specifications = SpecificationHistory::new(ledger.clone());
        let credit = CreditLedger::new(ledger.clone());
        let jobs = JobTracker::new(ledger.clone(), registry.clone());

        Ok(StratusServer {
            registry,
            ledger,
            appliances,
            accounts,
            specifications,
            credit,
            jobs,
        })
    }

    /// The registered state names, in registration order.
    pub fn state_names(&self) -> StratusResult<Vec<String>> {
        self.registry.names()
    }
}

// # Accounts
impl StratusServer {
    pub fn create_account(
        &self,
        kind: &str,
        handle: &str,
        name: &str,
        username: &str,
    ) -> StratusResult<AccountId> {
        self.accounts.create_account(kind, handle, name, username)
    }

    pub fn account_exists(&self, id: AccountId) -> StratusResult<bool> {
        self.accounts.exists(id)
    }

    /// Account record plus the derived credit balance.
    pub fn account_details(
        &self,
        id: AccountId,
    ) -> StratusResult<AccountDetails> {
        let record = self.accounts.record(id)?;
        let credits = self.credit.balance(id)?;
        Ok(AccountDetails {
            id: record.id,
            kind: record.kind,
            handle: record.handle,
            name: record.name,
            username: record.username,
            credits,
        })
    }

    pub fn add_credit(
        &self,
        id: AccountId,
        delta: i64,
    ) -> StratusResult<CreditReceipt> {
        if !self.accounts.exists(id)? {
            return Err(Error::UnknownAccount(id));
        }
        self.credit.adjust(id, delta)
    }

    pub fn check_credit(&self, id: AccountId) -> StratusResult<i64> {
        if !self.accounts.exists(id)? {
            return Err(Error::UnknownAccount(id));
        }
        self.credit.balance(id)
    }

    pub fn set_password_hash(
        &self,
        id: AccountId,
        hash: &str,
    ) -> StratusResult<u64> {
        self.accounts.set_password_hash(id, hash)
    }

    /// The latest credential hash for the adapter to verify against.
    pub fn password_hash(
        &self,
        id: AccountId,
    ) -> StratusResult<Option<String>> {
        self.accounts.password_hash(id)
    }

    /// The recent activity log of an account, latest first.
    pub fn account_history(
        &self,
        id: AccountId,
    ) -> StratusResult<Vec<Touch>> {
        self.accounts.record(id)?;
        self.ledger.full_history(id.into())?.collect()
    }

    pub fn update_account(&self, id: AccountId) -> StratusResult<()> {
        self.accounts.update(id)
    }

    pub fn delete_account(&self, id: AccountId) -> StratusResult<()> {
        self.accounts.delete(id)
    }
}

// # Appliances
impl StratusServer {
    pub fn create_appliance(
        &self,
        name: &str,
        uuid: Option<String>,
    ) -> StratusResult<ApplianceId> {
        self.appliances.create_appliance(name, uuid)
    }

    pub fn appliance_id_for_name(
        &self,
        name: &str,
    ) -> StratusResult<Option<ApplianceId>> {
        self.appliances.id_for_name(name)
    }

    pub fn appliance_details(
        &self,
        id: ApplianceId,
    ) -> StratusResult<ApplianceDetails> {
        self.appliances.details(id)
    }

    pub fn current_state(&self, id: ApplianceId) -> StratusResult<String> {
        self.appliances.current_state(id)
    }

    /// Applies a registered state to an appliance.
    ///
    /// Any registered state may be applied at any time; judging whether
    /// a transition makes business sense is the caller's concern.
    pub fn touch_state(
        &self,
        id: ApplianceId,
        state_name: &str,
    ) -> StratusResult<u64> {
        self.appliances.record(id)?;
        let state = self.registry.resolve(state_name)?;
        let touch = self
            .ledger
            .append(id.into(), TouchPayload::StateChange { state })?;
        Ok(touch.sequence())
    }

    /// Records an ownership grant or transfer.
    pub fn grant_ownership(
        &self,
        appliance: ApplianceId,
        account: AccountId,
    ) -> StratusResult<u64> {
        self.appliances.record(appliance)?;
        if !self.accounts.exists(account)? {
            return Err(Error::UnknownAccount(account));
        }
        let touch = self.ledger.append(
            appliance.into(),
            TouchPayload::OwnershipChange { account },
        )?;
        Ok(touch.sequence())
    }

    pub fn appliances_for_account(
        &self,
        account: AccountId,
    ) -> StratusResult<BTreeSet<ApplianceId>> {
        if !self.accounts.exists(account)? {
            return Err(Error::UnknownAccount(account));
        }
        self.appliances.list_by_owner(account)
    }

    pub fn appliances_in_state(
        &self,
        state_name: &str,
    ) -> StratusResult<BTreeSet<ApplianceId>> {
        self.appliances.list_by_state(state_name)
    }

    /// The recent activity log of an appliance, latest first.
    pub fn appliance_history(
        &self,
        id: ApplianceId,
    ) -> StratusResult<Vec<Touch>> {
        self.appliances.record(id)?;
        self.ledger.full_history(id.into())?.collect()
    }

    pub fn update_appliance(&self, id: ApplianceId) -> StratusResult<()> {
        self.appliances.update(id)
    }

    pub fn delete_appliance(&self, id: ApplianceId) -> StratusResult<()> {
        self.appliances.delete(id)
    }
}

// # Specifications
impl StratusServer {
    pub fn add_specification(
        &self,
        id: ApplianceId,
        cores: u32,
        ram: u32,
    ) -> StratusResult<u64> {
        self.appliances.record(id)?;
        self.specifications.add(id, cores, ram)
    }

    pub fn latest_specification(
        &self,
        id: ApplianceId,
    ) -> StratusResult<Specification> {
        self.appliances.record(id)?;
        self.specifications.latest(id)
    }

    pub fn previous_specification(
        &self,
        id: ApplianceId,
        n: usize,
    ) -> StratusResult<Specification> {
        self.appliances.record(id)?;
        self.specifications.previous(id, n)
    }
}

// # Jobs
impl StratusServer {
    /// Puts an appliance on its start chain and returns the job id.
    pub fn start_appliance(
        &self,
        id: ApplianceId,
    ) -> StratusResult<ApplianceId> {
        self.appliances.record(id)?;
        self.jobs.begin(id, Operation::Start)
    }

    /// Puts an appliance on its stop chain and returns the job id.
    pub fn stop_appliance(
        &self,
        id: ApplianceId,
    ) -> StratusResult<ApplianceId> {
        self.appliances.record(id)?;
        self.jobs.begin(id, Operation::Stop)
    }

    /// Advances a chain to the named phase.
    ///
    /// Phase ordering is the caller's responsibility.
    pub fn advance_job(
        &self,
        id: ApplianceId,
        phase: &str,
    ) -> StratusResult<u64> {
        self.appliances.record(id)?;
        self.jobs.advance(id, phase)
    }

    pub fn job_status(&self, job: ApplianceId) -> StratusResult<JobStatus> {
        self.appliances.record(job)?;
        self.jobs.status(job)
    }
}


//------------ Tests ---------------------------------------------------------
