//! Request generation: one operation in, one serialized payload out.
//!
//! The last loaded schema that declares the operation builds the document.
//! Options are applied in order, so a repeated option overrides the earlier
//! value in the document. The session default domain only applies when the
//! operation carries no `domain` option of its own.

use crate::config::Verbosity;
use crate::error::{ChainError, Result};
use crate::operation::{
    Operation, AMP_DOMAIN_OPTION, CLASS_OPTION, DOMAIN_OPTION, EXPECTED_STATUS, GET_STATUS,
    OBJECT_STATUS_CLASS,
};
use crate::schema::{BoundDocument, SchemaSet};

/// Build the request document for `op` and store it in `op.payload`.
///
/// Returns [`ChainError::SchemaNotFound`] when no loaded schema declares the
/// operation and [`ChainError::Generation`] when a value is rejected or a
/// source file cannot be read.
pub fn generate(
    schemas: &SchemaSet,
    op: &mut Operation,
    default_domain: Option<&str>,
    verbosity: Verbosity,
) -> Result<()> {
    let binder = schemas
        .resolve(op.name())
        .ok_or_else(|| ChainError::SchemaNotFound {
            operation: op.name().to_string(),
        })?;
    op.bind(binder.bind(op.name()));
    tracing::debug!(
        operation = op.name(),
        schema = binder.name(),
        endpoint = op.endpoint().unwrap_or_default(),
        "generating request"
    );

    let name = op.name().to_string();
    let wrap = |e: ChainError| match e {
        ChainError::Generation { .. } | ChainError::SchemaNotFound { .. } => e,
        other => ChainError::generation(name.clone(), other.to_string()),
    };

    let mut doc = binder.new_document();
    doc.set_target_node(&name).map_err(wrap)?;
    doc.set_envelope().map_err(wrap)?;

    if name == GET_STATUS && !op.has_option(CLASS_OPTION) {
        op.ensure_filter_out(EXPECTED_STATUS);
        doc.set_value(CLASS_OPTION, OBJECT_STATUS_CLASS).map_err(wrap)?;
    }

    let amp = op.is_amp();
    let mut explicit_domain = false;
    for option in op.options().to_vec() {
        let value = option.resolve().map_err(|e| {
            let source = option
                .source_file()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            ChainError::generation(name.clone(), format!("failed to read {}: {}", source, e))
        })?;
        tracing::debug!(
            operation = %name,
            option = option.name(),
            value = %verbosity.excerpt(&value),
            "applying option"
        );
        if option.name() == DOMAIN_OPTION {
            explicit_domain = true;
            op.domain = Some(value.clone());
            apply_domain(doc.as_mut(), &value, amp).map_err(wrap)?;
        } else {
            doc.set_value(option.name(), &value).map_err(wrap)?;
        }
    }

    if !explicit_domain {
        if let Some(domain) = default_domain {
            op.domain = Some(domain.to_string());
            apply_domain(doc.as_mut(), domain, amp).map_err(wrap)?;
        }
    }

    let payload = doc.serialize().map_err(wrap)?;
    tracing::debug!(operation = %name, payload = %verbosity.excerpt(&payload), "request generated");
    op.payload = Some(payload);
    Ok(())
}

/// The AMP dialect carries the domain as an upper-cased `Domain` field.
fn apply_domain(doc: &mut dyn BoundDocument, domain: &str, amp: bool) -> Result<()> {
    doc.set_value(DOMAIN_OPTION, domain)?;
    if amp {
        doc.set_value(AMP_DOMAIN_OPTION, domain)?;
    }
    Ok(())
}
