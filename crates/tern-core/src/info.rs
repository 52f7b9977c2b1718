//! Migration state classifier.
//!
//! [`MigrationInfoService::classify`] reconciles the resolved migrations
//! against the ledger rows and assigns exactly one [`MigrationState`] per
//! migration identity. It is a pure function of its inputs: ledger
//! inconsistencies surface as states (`MISSING_*`, `FUTURE_*`, `FAILED`),
//! never as errors. It only fails on unusable configuration or inputs.
//!
//! Identities:
//! - versioned migrations by version (a baseline migration and a regular
//!   migration may share a version),
//! - repeatable migrations by description, with one entry per applied run,
//! - synthetic marker rows by their installed rank.

use crate::applied::AppliedMigration;
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::migration_type::MigrationType;
use crate::pattern::MigrationPattern;
use crate::resolved::ResolvedMigration;
use crate::state::MigrationState;
use crate::version::MigrationVersion;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Classifier output for one migration identity.
#[derive(Debug, Clone)]
pub struct MigrationInfo {
    pub resolved: Option<ResolvedMigration>,
    pub applied: Option<AppliedMigration>,
    pub state: MigrationState,
}

impl MigrationInfo {
    pub fn version(&self) -> Option<&MigrationVersion> {
        match &self.applied {
            Some(applied) => applied.version.as_ref(),
            None => self.resolved.as_ref().and_then(|r| r.version.as_ref()),
        }
    }

    pub fn description(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => &applied.description,
            (None, Some(resolved)) => &resolved.description,
            (None, None) => "",
        }
    }

    pub fn migration_type(&self) -> Option<MigrationType> {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => Some(applied.migration_type),
            (None, Some(resolved)) => Some(resolved.migration_type),
            (None, None) => None,
        }
    }

    pub fn script(&self) -> &str {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => &applied.script,
            (None, Some(resolved)) => &resolved.script,
            (None, None) => "",
        }
    }

    /// Recorded checksum when applied, otherwise the resolved one.
    pub fn checksum(&self) -> Option<i32> {
        match (&self.applied, &self.resolved) {
            (Some(applied), _) => applied.checksum,
            (None, Some(resolved)) => resolved.checksum,
            (None, None) => None,
        }
    }

    pub fn installed_rank(&self) -> Option<i32> {
        self.applied.as_ref().map(|a| a.installed_rank)
    }

    pub fn installed_on(&self) -> Option<DateTime<Utc>> {
        self.applied.as_ref().map(|a| a.installed_on)
    }

    pub fn is_versioned(&self) -> bool {
        self.version().is_some()
    }

    /// Unversioned and not a synthetic marker.
    pub fn is_repeatable(&self) -> bool {
        self.version().is_none() && !self.migration_type().is_some_and(|t| t.is_synthetic())
    }

    /// "Versioned", "Repeatable", "Baseline" or "Schema" for reports.
    pub fn category(&self) -> &'static str {
        match self.migration_type() {
            Some(MigrationType::Baseline) => "Baseline",
            Some(MigrationType::Schema) => "Schema",
            _ if self.is_versioned() => "Versioned",
            _ => "Repeatable",
        }
    }

    /// Short label for messages.
    pub fn label(&self) -> String {
        match self.version() {
            Some(version) => format!("{} ({})", version, self.description()),
            None => self.description().to_string(),
        }
    }
}

/// Classified view over all known migrations.
#[derive(Debug, Clone)]
pub struct MigrationInfoService {
    infos: Vec<MigrationInfo>,
    target: Option<MigrationVersion>,
    last_resolved: MigrationVersion,
}

impl MigrationInfoService {
    /// Classify `resolved` against the ledger rows `applied` under `config`.
    pub fn classify(
        resolved: &[ResolvedMigration],
        applied: &[AppliedMigration],
        config: &Config,
    ) -> CoreResult<Self> {
        let inputs = Inputs::new(resolved, applied)?;

        match &config.target {
            MigrationVersion::Next => {
                // The ceiling is the lowest pending version, which is only
                // known after classifying without one.
                let unbounded = inputs.classify(config, None)?;
                let next = unbounded
                    .infos
                    .iter()
                    .find(|i| i.state == MigrationState::Pending && i.is_versioned())
                    .and_then(|i| i.version().cloned());
                match next {
                    Some(version) => inputs.classify(config, Some(version)),
                    None => Ok(unbounded),
                }
            }
            MigrationVersion::Latest => inputs.classify(config, None),
            MigrationVersion::Current => {
                let current = inputs.last_applied.clone();
                inputs.classify(config, Some(current))
            }
            MigrationVersion::Empty => Err(CoreError::ConfigInvalid {
                message: "target cannot be the empty schema version".to_string(),
            }),
            concrete => {
                let service = inputs.classify(config, Some(concrete.clone()))?;
                if config.fail_on_missing_target
                    && !service.infos.iter().any(|i| i.version() == Some(concrete))
                {
                    return Err(CoreError::ConfigInvalid {
                        message: format!(
                            "No migration with target version {concrete} could be found. \
                             Ensure target is specified correctly and the migration exists."
                        ),
                    });
                }
                Ok(service)
            }
        }
    }

    pub fn all(&self) -> &[MigrationInfo] {
        &self.infos
    }

    pub fn into_infos(self) -> Vec<MigrationInfo> {
        self.infos
    }

    /// Effective ceiling after resolving `current`/`next`; `None` means unbounded.
    pub fn target(&self) -> Option<&MigrationVersion> {
        self.target.as_ref()
    }

    /// Highest resolvable version, or the empty version.
    pub fn last_resolved(&self) -> &MigrationVersion {
        &self.last_resolved
    }

    /// The applied migration with the highest version, falling back to the
    /// most recent applied repeatable.
    pub fn current(&self) -> Option<&MigrationInfo> {
        let versioned = self
            .infos
            .iter()
            .filter(|i| i.state.is_applied() && i.is_versioned())
            .max_by(|a, b| a.version().cmp(&b.version()));
        if versioned.is_some() {
            return versioned;
        }
        self.infos
            .iter()
            .filter(|i| i.state.is_applied())
            .max_by_key(|i| i.installed_rank())
    }

    pub fn pending(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s == MigrationState::Pending)
    }

    pub fn applied(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s.is_applied())
    }

    pub fn resolved(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s.is_resolved())
    }

    pub fn failed(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s.is_failed())
    }

    pub fn future(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s.is_future())
    }

    pub fn missing(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s.is_missing())
    }

    pub fn out_of_order(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s == MigrationState::OutOfOrder)
    }

    pub fn outdated(&self) -> Vec<&MigrationInfo> {
        self.with_state(|s| s == MigrationState::Outdated)
    }

    fn with_state<F: Fn(MigrationState) -> bool>(&self, pred: F) -> Vec<&MigrationInfo> {
        self.infos.iter().filter(|i| pred(i.state)).collect()
    }
}

/// Classify and return the infos in report order.
pub fn classify(
    resolved: &[ResolvedMigration],
    applied: &[AppliedMigration],
    config: &Config,
) -> CoreResult<Vec<MigrationInfo>> {
    Ok(MigrationInfoService::classify(resolved, applied, config)?.into_infos())
}

type VersionKey = (MigrationVersion, bool);

fn version_key(version: &MigrationVersion, migration_type: MigrationType) -> VersionKey {
    (version.clone(), migration_type.is_baseline_migration())
}

/// Indexed, validated classifier inputs plus the facts derived from the
/// ledger alone.
struct Inputs<'a> {
    versioned: BTreeMap<VersionKey, &'a ResolvedMigration>,
    repeatable: BTreeMap<&'a str, &'a ResolvedMigration>,
    applied: Vec<&'a AppliedMigration>,
    out_of_order_ranks: HashSet<i32>,
    latest_repeatable_runs: HashMap<&'a str, i32>,
    baseline: Option<MigrationVersion>,
    has_applied_versions: bool,
    last_resolved: MigrationVersion,
    last_applied: MigrationVersion,
}

impl<'a> Inputs<'a> {
    fn new(resolved: &'a [ResolvedMigration], applied: &'a [AppliedMigration]) -> CoreResult<Self> {
        let mut versioned = BTreeMap::new();
        let mut repeatable = BTreeMap::new();
        let mut last_resolved = MigrationVersion::Empty;

        for migration in resolved {
            if migration.migration_type.is_synthetic() {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "Resolved migration {} cannot have synthetic type {}",
                        migration.script, migration.migration_type
                    ),
                });
            }
            match &migration.version {
                Some(version) => {
                    if !version.is_concrete() {
                        return Err(CoreError::InvalidVersion {
                            version: version.to_string(),
                            reason: format!("{} must have a concrete version", migration.script),
                        });
                    }
                    let key = version_key(version, migration.migration_type);
                    if versioned.insert(key, migration).is_some() {
                        return Err(CoreError::ConfigInvalid {
                            message: format!("Found more than one migration with version {version}"),
                        });
                    }
                    if *version > last_resolved {
                        last_resolved = version.clone();
                    }
                }
                None => {
                    if migration.migration_type.is_baseline_migration() {
                        return Err(CoreError::ConfigInvalid {
                            message: format!(
                                "Baseline migration {} must have a version",
                                migration.script
                            ),
                        });
                    }
                    if repeatable
                        .insert(migration.description.as_str(), migration)
                        .is_some()
                    {
                        return Err(CoreError::ConfigInvalid {
                            message: format!(
                                "Found more than one repeatable migration with description '{}'",
                                migration.description
                            ),
                        });
                    }
                }
            }
        }

        let mut applied: Vec<&AppliedMigration> = applied.iter().collect();
        applied.sort_by_key(|a| a.installed_rank);

        let mut out_of_order_ranks = HashSet::new();
        let mut latest_repeatable_runs: HashMap<&str, i32> = HashMap::new();
        let mut baseline = None;
        let mut has_applied_versions = false;
        let mut last_applied = MigrationVersion::Empty;

        for row in &applied {
            if row.migration_type == MigrationType::Baseline && baseline.is_none() {
                baseline = row.version.clone();
            }
            match &row.version {
                Some(version) => {
                    if !row.is_synthetic() {
                        has_applied_versions = true;
                    }
                    if *version > last_applied {
                        last_applied = version.clone();
                    } else {
                        out_of_order_ranks.insert(row.installed_rank);
                    }
                }
                None if row.is_repeatable() => {
                    let latest = latest_repeatable_runs
                        .entry(row.description.as_str())
                        .or_insert(row.installed_rank);
                    if row.installed_rank > *latest {
                        *latest = row.installed_rank;
                    }
                }
                None => {}
            }
        }

        Ok(Self {
            versioned,
            repeatable,
            applied,
            out_of_order_ranks,
            latest_repeatable_runs,
            baseline,
            has_applied_versions,
            last_resolved,
            last_applied,
        })
    }

    fn classify(&self, config: &Config, target: Option<MigrationVersion>) -> CoreResult<MigrationInfoService> {
        if let (Some(target), Some(baseline)) = (&target, &self.baseline) {
            if target.is_concrete() && target < baseline {
                return Err(CoreError::ConfigInvalid {
                    message: format!(
                        "target version {target} is below the baseline version {baseline}"
                    ),
                });
            }
        }

        let ctx = Context {
            inputs: self,
            target: target.as_ref(),
            out_of_order: config.out_of_order,
            cherry_pick: config.cherry_pick.as_deref(),
            latest_baseline_migration: self.latest_baseline_migration(target.as_ref()),
        };

        let mut infos = Vec::with_capacity(self.applied.len() + self.versioned.len());
        let mut matched_versions: HashSet<VersionKey> = HashSet::new();

        for row in &self.applied {
            let resolved = match (&row.version, row.migration_type) {
                (_, MigrationType::Schema) | (_, MigrationType::Baseline) => None,
                (Some(version), ty) => {
                    let key = version_key(version, ty);
                    let found = self.versioned.get(&key).copied();
                    matched_versions.insert(key);
                    found
                }
                (None, _) => self.repeatable.get(row.description.as_str()).copied(),
            };
            infos.push(MigrationInfo {
                resolved: resolved.cloned(),
                applied: Some((*row).clone()),
                state: ctx.applied_state(row, resolved),
            });
        }

        for (key, resolved) in &self.versioned {
            if matched_versions.contains(key) {
                continue;
            }
            infos.push(MigrationInfo {
                resolved: Some((*resolved).clone()),
                applied: None,
                state: ctx.unapplied_versioned_state(resolved),
            });
        }

        for (description, resolved) in &self.repeatable {
            if self.repeatable_is_current(description, resolved) {
                continue;
            }
            infos.push(MigrationInfo {
                resolved: Some((*resolved).clone()),
                applied: None,
                state: ctx.unapplied_repeatable_state(resolved),
            });
        }

        infos.sort_by(report_order);

        Ok(MigrationInfoService {
            infos,
            target,
            last_resolved: self.last_resolved.clone(),
        })
    }

    /// The baseline migration that would bootstrap an empty ledger.
    fn latest_baseline_migration(&self, target: Option<&MigrationVersion>) -> Option<MigrationVersion> {
        if self.has_applied_versions || self.baseline.is_some() {
            return None;
        }
        self.versioned
            .iter()
            .filter(|((version, is_baseline), _)| {
                *is_baseline && target.map_or(true, |t| version <= t)
            })
            .map(|((version, _), _)| version.clone())
            .max()
    }

    /// A repeatable is up to date when its latest run carries the resolved checksum.
    fn repeatable_is_current(&self, description: &str, resolved: &ResolvedMigration) -> bool {
        let Some(latest_rank) = self.latest_repeatable_runs.get(description) else {
            return false;
        };
        self.applied
            .iter()
            .find(|a| a.installed_rank == *latest_rank)
            .is_some_and(|a| resolved.checksum_matches(a.checksum))
    }
}

struct Context<'c, 'a> {
    inputs: &'c Inputs<'a>,
    target: Option<&'c MigrationVersion>,
    out_of_order: bool,
    cherry_pick: Option<&'c [MigrationPattern]>,
    latest_baseline_migration: Option<MigrationVersion>,
}

impl Context<'_, '_> {
    fn applied_state(&self, row: &AppliedMigration, resolved: Option<&ResolvedMigration>) -> MigrationState {
        match row.migration_type {
            MigrationType::Schema => return MigrationState::Success,
            MigrationType::Baseline => return MigrationState::Baseline,
            _ => {}
        }

        let Some(version) = &row.version else {
            return self.applied_repeatable_state(row, resolved);
        };

        if resolved.is_none() {
            return match (version < &self.inputs.last_resolved, row.success) {
                (true, true) => MigrationState::MissingSuccess,
                (true, false) => MigrationState::MissingFailed,
                (false, true) => MigrationState::FutureSuccess,
                (false, false) => MigrationState::FutureFailed,
            };
        }

        if !row.success {
            MigrationState::Failed
        } else if self.inputs.out_of_order_ranks.contains(&row.installed_rank) {
            MigrationState::OutOfOrder
        } else {
            MigrationState::Success
        }
    }

    fn applied_repeatable_state(
        &self,
        row: &AppliedMigration,
        resolved: Option<&ResolvedMigration>,
    ) -> MigrationState {
        let is_latest = self
            .inputs
            .latest_repeatable_runs
            .get(row.description.as_str())
            == Some(&row.installed_rank);

        if !is_latest {
            return MigrationState::Superseded;
        }

        match resolved {
            None if row.success => MigrationState::MissingSuccess,
            None => MigrationState::MissingFailed,
            Some(_) if !row.success => MigrationState::Failed,
            Some(resolved) if resolved.checksum_matches(row.checksum) => MigrationState::Success,
            Some(_) => MigrationState::Outdated,
        }
    }

    fn unapplied_versioned_state(&self, resolved: &ResolvedMigration) -> MigrationState {
        let Some(version) = &resolved.version else {
            return self.unapplied_repeatable_state(resolved);
        };

        if self.target.is_some_and(|t| version > t) {
            return MigrationState::AboveTarget;
        }

        if let Some(baseline) = &self.inputs.baseline {
            match version.cmp(baseline) {
                Ordering::Less => return MigrationState::BelowBaseline,
                Ordering::Equal => return MigrationState::BaselineIgnored,
                Ordering::Greater => {}
            }
        }

        if resolved.migration_type.is_baseline_migration() {
            if self.latest_baseline_migration.as_ref() != Some(version) {
                return MigrationState::BaselineIgnored;
            }
        } else if self
            .latest_baseline_migration
            .as_ref()
            .is_some_and(|latest| version <= latest)
        {
            return MigrationState::BelowBaseline;
        }

        if !self.is_cherry_picked(resolved) {
            return MigrationState::Ignored;
        }

        if !self.out_of_order && *version < self.inputs.last_applied {
            return MigrationState::Ignored;
        }

        MigrationState::Pending
    }

    fn unapplied_repeatable_state(&self, resolved: &ResolvedMigration) -> MigrationState {
        if self.is_cherry_picked(resolved) {
            MigrationState::Pending
        } else {
            MigrationState::Ignored
        }
    }

    fn is_cherry_picked(&self, resolved: &ResolvedMigration) -> bool {
        match self.cherry_pick {
            None => true,
            Some(patterns) => patterns
                .iter()
                .any(|p| p.matches(resolved.version.as_ref(), &resolved.description)),
        }
    }
}

/// Below-baseline entries, then ledger rows by rank, then unapplied
/// versioned migrations by version, then unapplied repeatables by description.
fn report_order(a: &MigrationInfo, b: &MigrationInfo) -> Ordering {
    fn group(info: &MigrationInfo) -> u8 {
        match (&info.applied, info.state) {
            (Some(_), _) => 1,
            (None, MigrationState::BelowBaseline | MigrationState::BaselineIgnored) => 0,
            (None, _) if info.is_versioned() => 2,
            (None, _) => 3,
        }
    }

    group(a).cmp(&group(b)).then_with(|| match group(a) {
        1 => a.installed_rank().cmp(&b.installed_rank()),
        3 => a.description().cmp(b.description()),
        _ => a
            .version()
            .cmp(&b.version())
            .then_with(|| a.migration_type().map(|t| t.is_baseline_migration()).cmp(
                &b.migration_type().map(|t| t.is_baseline_migration()),
            )),
    })
}

#[cfg(test)]
#[path = "info_test.rs"]
mod tests;
