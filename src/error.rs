//! Error taxonomy for ingestion, loading, configuration and export.
//!
//! Every error is reported to the caller of the operation that raised it and
//! confines its effect to that one operation (one submission, one load cycle,
//! one export).

use thiserror::Error;

use crate::records::Category;

/// Failures at the record store boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The write could not complete. No record was created.
    #[error("failed to persist {category} record: {reason}")]
    Persistence { category: Category, reason: String },

    /// A collection could not be read.
    #[error("failed to fetch {category} records: {reason}")]
    Fetch { category: Category, reason: String },
}

impl StoreError {
    pub fn persistence(category: Category, reason: impl Into<String>) -> Self {
        Self::Persistence {
            category,
            reason: reason.into(),
        }
    }

    pub fn fetch(category: Category, reason: impl Into<String>) -> Self {
        Self::Fetch {
            category,
            reason: reason.into(),
        }
    }

    /// Message shown to the person who triggered the operation.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::Persistence {
                category: Category::Cashier,
                ..
            } => "Erro ao registrar operação. Tente novamente.",
            Self::Persistence { .. } => "Erro ao registrar atendimento. Tente novamente.",
            Self::Fetch { .. } => "Erro ao carregar os dados. Nenhum dado exibido.",
        }
    }
}

/// Form submission rejected before reaching the store.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("campo obrigatório não preenchido: {label}")]
    MissingRequired { field: String, label: String },

    #[error("payload must be a JSON object")]
    NotAnObject,
}

/// Export failures. `EmptyResult` is a user-facing no-op, not a pipeline fault.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Não há dados para exportar.")]
    EmptyResult,

    #[error("failed to encode {format} export: {reason}")]
    Encode {
        format: &'static str,
        reason: String,
    },

    #[error("failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    pub fn encode(format: &'static str, reason: impl std::fmt::Display) -> Self {
        Self::Encode {
            format,
            reason: reason.to_string(),
        }
    }

    pub fn is_empty_result(&self) -> bool {
        matches!(self, Self::EmptyResult)
    }
}

/// Configuration could not be assembled.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Configuration section '{section}' is not configured (missing required fields)")]
    NotConfigured { section: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_carry_category_and_user_message() {
        let err = StoreError::persistence(Category::Cashier, "HTTP 503");
        assert_eq!(err.to_string(), "failed to persist caixa record: HTTP 503");
        assert_eq!(
            err.user_message(),
            "Erro ao registrar operação. Tente novamente."
        );
        assert_eq!(
            StoreError::persistence(Category::InPerson, "x").user_message(),
            "Erro ao registrar atendimento. Tente novamente."
        );

        let err = StoreError::fetch(Category::InPerson, "timeout");
        assert!(err.to_string().contains("loja-fisica"));
    }

    #[test]
    fn empty_export_reports_notice() {
        let err = ExportError::EmptyResult;
        assert!(err.is_empty_result());
        assert_eq!(err.to_string(), "Não há dados para exportar.");
    }
}
