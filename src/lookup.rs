// 🔎 Lookup Resolver - association names → ids, created on first sight
//
// Search-then-create is not atomic; rows are processed one at a time so two
// rows can never race to create the same (name, type).

use crate::entities::AssociationType;
use crate::error::Result;
use crate::rules::RuleSet;
use crate::store::RecordStore;
use std::cell::Cell;
use tracing::debug;

/// Association ids for one row; None where the cell was blank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolvedAssociations {
    pub sector_id: Option<i64>,
    pub resource_id: Option<i64>,
    pub exhibition_id: Option<i64>,
}

impl ResolvedAssociations {
    fn set(&mut self, association_type: AssociationType, id: Option<i64>) {
        match association_type {
            AssociationType::Sector => self.sector_id = id,
            AssociationType::Resource => self.resource_id = id,
            AssociationType::Exhibition => self.exhibition_id = id,
        }
    }
}

pub struct LookupResolver<'r> {
    rules: &'r RuleSet,
    created: Cell<usize>,
}

impl<'r> LookupResolver<'r> {
    pub fn new(rules: &'r RuleSet) -> Self {
        LookupResolver {
            rules,
            created: Cell::new(0),
        }
    }

    /// Associations created by this resolver so far
    pub fn created(&self) -> usize {
        self.created.get()
    }

    /// Find-or-create one association; blank and "Select" resolve to None
    pub fn resolve<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        name: Option<&str>,
        association_type: AssociationType,
    ) -> Result<Option<i64>> {
        if self.rules.is_blank_choice(name) {
            return Ok(None);
        }
        let name = name.map(str::trim).unwrap_or_default();

        if let Some(existing) = store.find_association(name, association_type)? {
            return Ok(Some(existing.id));
        }

        let created = store.create_association(name, association_type)?;
        self.created.set(self.created.get() + 1);
        debug!(id = created.id, name, kind = %association_type, "association created");

        Ok(Some(created.id))
    }

    /// Resolve sector, resource and exhibition, in that order
    pub fn resolve_all<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        sector: Option<&str>,
        resource: Option<&str>,
        exhibition: Option<&str>,
    ) -> Result<ResolvedAssociations> {
        let mut resolved = ResolvedAssociations::default();

        for (association_type, name) in [
            (AssociationType::Sector, sector),
            (AssociationType::Resource, resource),
            (AssociationType::Exhibition, exhibition),
        ] {
            resolved.set(association_type, self.resolve(store, name, association_type)?);
        }

        Ok(resolved)
    }

    /// Title with the dropdown placeholder removed
    pub fn sanitize_title(&self, title: Option<&str>) -> Option<String> {
        if self.rules.is_blank_choice(title) {
            None
        } else {
            title.map(|t| t.trim().to_string())
        }
    }
}
