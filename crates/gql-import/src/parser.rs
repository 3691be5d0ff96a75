//! SDL parsing

use crate::model::SchemaDocument;
use crate::{Error, Result};
use graphql_parser::schema::parse_schema;
use tracing::trace;

/// Parse comment-free SDL into an owned document.
///
/// Returns `Ok(None)` for blank input. `id` only serves error reporting.
pub fn parse_sdl(id: &str, sdl: &str) -> Result<Option<SchemaDocument>> {
    let body = sdl.trim();
    if body.is_empty() {
        trace!("No definitions left in {}", id);
        return Ok(None);
    }

    let document = parse_schema::<String>(body).map_err(|e| Error::Parse {
        id: id.to_string(),
        message: e.to_string(),
    })?;

    Ok(Some(document.into_static()))
}
