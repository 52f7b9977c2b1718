//! Engine operations over a ledger, a connection and a resolved migration set.
//!
//! Each operation lives in its own module and is exposed as a method on
//! [`Engine`]. Every operation returns a serializable result so callers can
//! report on it without relying on the observer.

mod baseline;
mod info;
mod migrate;
mod repair;
mod validate;

pub use baseline::BaselineResult;
pub use info::{InfoOutput, InfoResult};
pub use migrate::{MigrateError, MigrateOutput, MigrateResult, MigrateStatus};
pub use repair::{RepairOptions, RepairOutput, RepairResult};

use crate::config::Config;
use crate::error::CoreResult;
use crate::executor::Connection;
use crate::history::SchemaHistory;
use crate::info::MigrationInfoService;
use crate::observer::{LogObserver, MigrationObserver};
use crate::resolved::ResolvedMigration;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

static LOG_OBSERVER: LogObserver = LogObserver;

/// Runs migrate, repair, baseline, validate and info against one ledger.
pub struct Engine<'a, H: SchemaHistory> {
    history: &'a H,
    connection: &'a dyn Connection,
    migrations: &'a [ResolvedMigration],
    config: &'a Config,
    observer: &'a dyn MigrationObserver,
    cancel: Option<Arc<AtomicBool>>,
}

impl<'a, H: SchemaHistory> Engine<'a, H> {
    /// Engine reporting through the `log` facade.
    pub fn new(
        history: &'a H,
        connection: &'a dyn Connection,
        migrations: &'a [ResolvedMigration],
        config: &'a Config,
    ) -> Self {
        Self {
            history,
            connection,
            migrations,
            config,
            observer: &LOG_OBSERVER,
            cancel: None,
        }
    }

    pub fn with_observer(mut self, observer: &'a dyn MigrationObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stop migrating before the next migration once `flag` is set.
    /// A migration that has started always runs to completion.
    pub fn with_cancellation(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Classify against the current ledger, treating an absent ledger as empty.
    fn classify(&self) -> CoreResult<MigrationInfoService> {
        let applied = if self.history.exists()? {
            self.history.all_applied_migrations()?
        } else {
            Vec::new()
        };
        MigrationInfoService::classify(self.migrations, &applied, self.config)
    }

    fn warn(&self, warnings: &mut Vec<String>, message: String) {
        self.observer.on_warning(&message);
        warnings.push(message);
    }
}
