//! Export specification validation
//!
//! [`validate_and_fill`] proves an export record is executable before it is
//! persisted: the target collection and owner must resolve, the header
//! list must parse, a one-row dry run with the declared filter, sort and
//! access rule must succeed, and every header path must resolve through
//! the schema to a single value.
//!
//! Every failure is a [`ValidationError`] attributed to the record fields
//! a client should highlight.

use tracing::debug;

use crate::error::{ExportError, Result, ValidationError, ValidationKind};
use crate::store::{Collection, Principal, Record, RecordStore};

use super::format::parse_timezone;
use super::query::scoped_query;
use super::spec::{
    EXPORT_COLLECTION_NAME, ExportSpecification, HeaderItem, OutputFormat, fields, parse_headers,
};

/// Fields flagged when the target collection or owner cannot be resolved
const REFERENCE_FIELDS: [&str; 4] = [
    fields::EXPORT_COLLECTION_NAME,
    fields::HEADERS,
    fields::OWNER_ID,
    fields::OWNER_COLLECTION_NAME,
];

/// Validate an export record and build its specification
///
/// # Arguments
/// * `store` - Record store the export reads from
/// * `record` - Untrusted export record
///
/// # Returns
/// * `Result<ExportSpecification>` - Filled specification or a validation error
pub async fn validate_and_fill(store: &dyn RecordStore, record: &Record) -> Result<ExportSpecification> {
    let spec = fill(store, record).await?;

    dry_run(store, &spec).await?;

    for item in &spec.headers {
        check_header(store, &spec.collection, item).await?;
    }

    debug!(
        "Validated export of '{}' with {} headers",
        spec.collection.name,
        spec.headers.len()
    );
    Ok(spec)
}

/// Resolve the collaborators of an export record without running queries
///
/// Used again at generation time, after the record has been re-fetched.
pub async fn fill(store: &dyn RecordStore, record: &Record) -> Result<ExportSpecification> {
    if !record.belongs_to(EXPORT_COLLECTION_NAME) {
        return Err(ValidationError::not_an_export().into());
    }

    let (collection, principal) = resolve_references(store, record)
        .await
        .map_err(|e| ValidationError::new(ValidationKind::InvalidReference, &REFERENCE_FIELDS, e.to_string()))?;

    let headers = parse_headers(&record.get(fields::HEADERS)).map_err(|msg| {
        ValidationError::new(
            ValidationKind::InvalidHeaders,
            &[fields::HEADERS],
            format!("invalid headers: {msg}"),
        )
    })?;

    let raw_format = record.get_string(fields::FORMAT);
    let format = OutputFormat::parse(&raw_format).ok_or_else(|| {
        ValidationError::new(
            ValidationKind::InvalidFormat,
            &[fields::FORMAT],
            format!("unsupported format '{raw_format}', expected csv or xlsx"),
        )
    })?;

    Ok(ExportSpecification {
        record: record.clone(),
        collection,
        principal,
        headers,
        filter: record.get_string(fields::FILTER),
        sort: record.get_string(fields::SORT),
        format,
        output: record.get_string(fields::OUTPUT),
    })
}

/// Target collection and acting principal of an export record
///
/// An owner id with an owner collection names an auth record; an owner id
/// alone names an admin; no owner id means anonymous.
async fn resolve_references(store: &dyn RecordStore, record: &Record) -> Result<(Collection, Principal)> {
    let collection = store
        .find_collection(&record.get_string(fields::EXPORT_COLLECTION_NAME))
        .await?;

    let owner_id = record.get_string(fields::OWNER_ID);
    let owner_collection = record.get_string(fields::OWNER_COLLECTION_NAME);

    let principal = match (owner_id.is_empty(), owner_collection.is_empty()) {
        (true, _) => Principal::Anonymous,
        (false, false) => Principal::Record(store.find_record(&owner_collection, &owner_id).await?),
        (false, true) => Principal::Admin(store.find_admin(&owner_id).await?),
    };

    Ok((collection, principal))
}

/// One-row query with the declared filter, sort and access rule
async fn dry_run(store: &dyn RecordStore, spec: &ExportSpecification) -> Result<()> {
    let query = scoped_query(&spec.collection, &spec.principal, &spec.filter, &spec.sort).page(1, 1);
    let mut records = Vec::with_capacity(1);

    store.query(&query, &mut records).await.map_err(|e| {
        ExportError::from(ValidationError::new(
            ValidationKind::InvalidQuery,
            &[fields::FILTER, fields::SORT],
            e.to_string(),
        ))
    })
}

/// Check a header's path against the schema and its timezone
async fn check_header(store: &dyn RecordStore, root: &Collection, item: &HeaderItem) -> Result<()> {
    let invalid = |message: String| {
        ExportError::from(ValidationError::new(
            ValidationKind::InvalidHeaders,
            &[fields::HEADERS],
            message,
        ))
    };

    let segments: Vec<&str> = item.field_name.split('.').collect();
    let Some((last, relations)) = segments.split_last() else {
        return Err(invalid("empty field path".to_string()));
    };

    let mut current = root.clone();
    for segment in relations {
        let field = current.field(segment).ok_or_else(|| {
            invalid(format!("unknown field \"{segment}\" in \"{}\"", current.name))
        })?;
        let (target, single) = field.kind.relation().ok_or_else(|| {
            invalid(format!("field \"{segment}\" of \"{}\" is not a relation", current.name))
        })?;
        if !single {
            return Err(invalid(format!(
                "header \"{}\" crosses the multiple relation \"{segment}\"",
                item.field_name
            )));
        }
        current = store
            .find_collection(target)
            .await
            .map_err(|e| invalid(format!("cannot resolve \"{segment}\": {e}")))?;
    }

    if !current.has_field(last) {
        return Err(invalid(format!("unknown field \"{last}\" in \"{}\"", current.name)));
    }

    if !item.timezone.is_empty() && parse_timezone(&item.timezone).is_none() {
        return Err(invalid(format!("unknown time zone {}", item.timezone)));
    }

    Ok(())
}
