// ⚖️ Reconciler - create, update or reject a row against existing records
//
// Email is the merge key. The row updates the record owning its email,
// unless that record holds a mobile of its own and the row's mobile belongs
// to yet another record: the row then describes two different contacts and
// has no update target. An owner without a mobile stays the target, so a
// row whose mobile was cleared on its first import updates on the next.
//
// With the target fixed, each contact is usable when it is present and no
// record other than the target owns it:
//
//   email | mobile | outcome
//   ------+--------+---------------------------
//   yes   | yes    | keep both
//   yes   | no     | clear mobile
//   no    | yes    | clear email
//   no    | no     | reject (CONTACTS_UNUSABLE)

use crate::entities::Record;
use crate::error::{ImportError, Result, CONTACTS_UNUSABLE};
use crate::store::RecordStore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

// ============================================================================
// CONTEXT & DECISION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileContext {
    /// Bulk upload: the target is found through the row's email
    Import,

    /// Admin edit form: the edited record is the target
    Edit(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContactDecision {
    KeepBoth,
    ClearMobile,
    ClearEmail,
}

impl ContactDecision {
    /// Apply the decision table; both unusable rejects the row
    pub fn decide(email_usable: bool, mobile_usable: bool) -> Result<Self> {
        match (email_usable, mobile_usable) {
            (true, true) => Ok(ContactDecision::KeepBoth),
            (true, false) => Ok(ContactDecision::ClearMobile),
            (false, true) => Ok(ContactDecision::ClearEmail),
            (false, false) => Err(ImportError::rejected(CONTACTS_UNUSABLE)),
        }
    }
}

// ============================================================================
// RECONCILIATION RESULT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Existing record to update, or a fresh one to insert
    pub target: Record,
    pub decision: ContactDecision,

    /// Contacts that survive the decision
    pub email: Option<String>,
    pub mobile_number: Option<String>,
}

impl Reconciliation {
    pub fn is_update(&self) -> bool {
        self.target.is_persisted()
    }
}

// ============================================================================
// RECONCILER
// ============================================================================

#[derive(Debug, Clone, Copy, Default)]
pub struct Reconciler;

impl Reconciler {
    pub fn new() -> Self {
        Reconciler
    }

    /// Id of the record this row should update, if any
    pub fn merge_target<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        email: Option<&str>,
        mobile: Option<&str>,
        context: ReconcileContext,
    ) -> Result<Option<i64>> {
        if let ReconcileContext::Edit(id) = context {
            return Ok(Some(id));
        }

        let Some(email) = email else {
            return Ok(None);
        };
        let Some(owner) = store.find_record_owner_by_email(email)? else {
            return Ok(None);
        };

        let Some(mobile) = mobile else {
            return Ok(Some(owner));
        };
        match store.find_record_owner_by_mobile(mobile)? {
            Some(mobile_owner) if mobile_owner != owner => {
                let owner_mobile = Self::load(store, owner)?.mobile_number;
                if owner_mobile.is_some() {
                    debug!(owner, mobile_owner, "email and mobile belong to different records");
                    return Ok(None);
                }
                Ok(Some(owner))
            }
            _ => Ok(Some(owner)),
        }
    }

    pub fn reconcile<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        email: Option<String>,
        mobile_number: Option<String>,
        context: ReconcileContext,
    ) -> Result<Reconciliation> {
        let target_id = self.merge_target(store, email.as_deref(), mobile_number.as_deref(), context)?;

        let email_usable = match email.as_deref() {
            Some(email) => !store.record_exists_by_email(email, target_id)?,
            None => false,
        };
        let mobile_usable = match mobile_number.as_deref() {
            Some(mobile) => !store.record_exists_by_mobile(mobile, target_id)?,
            None => false,
        };

        let decision = ContactDecision::decide(email_usable, mobile_usable)?;

        let email = match decision {
            ContactDecision::ClearEmail => {
                if let Some(email) = &email {
                    warn!(%email, "email already belongs to another record, clearing");
                }
                None
            }
            _ => email,
        };
        let mobile_number = match decision {
            ContactDecision::ClearMobile => {
                if let Some(mobile) = &mobile_number {
                    warn!(%mobile, "mobile number already belongs to another record, clearing");
                }
                None
            }
            _ => mobile_number,
        };

        let target = match (context, target_id) {
            (ReconcileContext::Edit(id), _) => Self::load(store, id)?,
            // Email is the only merge key; without it the row is a new record
            (ReconcileContext::Import, Some(id)) if email.is_some() => Self::load(store, id)?,
            _ => Record::new(),
        };

        debug!(?decision, target = ?target.id, "row reconciled");

        Ok(Reconciliation {
            target,
            decision,
            email,
            mobile_number,
        })
    }

    fn load<S: RecordStore + ?Sized>(store: &S, id: i64) -> Result<Record> {
        store
            .find_record(id)?
            .ok_or_else(|| ImportError::NotFound(format!("record {}", id)))
    }
}

// ============================================================================
// TESTS
// ============================================================================
