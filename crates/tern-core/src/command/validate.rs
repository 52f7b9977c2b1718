//! Validate the ledger against the resolved migrations.

use super::Engine;
use crate::error::{CoreError, CoreResult};
use crate::history::SchemaHistory;
use crate::validate::{validate_infos, ValidateResult};

impl<H: SchemaHistory> Engine<'_, H> {
    /// Report every classification problem. Pending migrations are errors.
    pub fn validate(&self) -> CoreResult<ValidateResult> {
        let service = self.classify()?;
        let mut result = validate_infos(service.all(), self.config, false);
        if result.valid {
            for info in service.future() {
                result.warnings.push(format!(
                    "Schema history {} has future migration {}",
                    self.history.table(),
                    info.label()
                ));
            }
        }
        for warning in &result.warnings {
            self.observer.on_warning(warning);
        }
        if result.valid {
            self.observer.on_info(&format!(
                "Successfully validated {} migration(s)",
                result.validated_count
            ));
        }
        Ok(result)
    }

    /// [`Self::validate`], failing with [`CoreError::Validation`] when
    /// anything is wrong.
    pub fn validate_or_err(&self) -> CoreResult<ValidateResult> {
        let result = self.validate()?;
        if !result.valid {
            return Err(CoreError::Validation {
                errors: result.error_messages(),
            });
        }
        Ok(result)
    }
}
