//! # gql-import
//!
//! Import resolution and definition merging for GraphQL SDL.
//!
//! A root schema document pulls in other documents through `# import`
//! comment directives. The loader follows those directives (cycles and
//! diamonds included, each document is loaded once), and the merger folds
//! every definition sharing a name into one:
//!
//! ```text
//! # import * from "./user.graphql"
//! type Query { me: User }
//! ```
//!
//! Loading and merging can both be extended with plugins, see [`plugin`].

pub mod canonical;
pub mod config;
pub mod loader;
pub mod merge;
pub mod model;
pub mod parser;
pub mod plugin;
pub mod plugins;
pub mod scanner;

pub use config::{BuildOptions, ImportConfig};
pub use loader::{DefaultLoader, ImportLoader, Resolution};
pub use merge::{DuplicatePolicy, Merger, ResolverTable};
pub use model::{
    Definition, DefinitionKind, ImportReference, ImportedDocument, LoadOutput, Requested,
    SchemaDocument,
};
pub use plugin::{LoadPlugin, MergePlugin, Plugin};
pub use plugins::{CachePlugin, FetchLog, HttpPlugin, MemorySources, PerKindMerge};
pub use scanner::DirectiveScanner;

use graphql_parser::schema;
use thiserror::Error;

/// Errors that can occur while importing or merging schema documents
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported protocol « {protocol} » - Use the appropriate plugin to handle this protocol ({id})")]
    UnsupportedProtocol { protocol: String, id: String },

    #[error("Failed to fetch schema : {message} ({id})")]
    Fetch { id: String, message: String },

    #[error("Failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Syntax error in {id}: {message}")]
    Parse { id: String, message: String },

    #[error(
        "Unable to merge {}of types \"{incoming}\" and \"{survivor}\"",
        .name.as_ref().map(|n| format!("\"{n}\" ")).unwrap_or_default()
    )]
    KindMismatch {
        name: Option<String>,
        incoming: DefinitionKind,
        survivor: DefinitionKind,
    },

    #[error("No resolver to resolve conflict with types \"{kind}\"")]
    NoResolver { kind: DefinitionKind },

    #[error("{member} \"{name}\" defined multiple times in \"{owner}\"")]
    DuplicateMember {
        member: &'static str,
        name: String,
        owner: String,
    },

    #[error("Invalid import pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Import task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Resolve `root_id` and everything it imports, then merge all definitions
/// into a single document.
pub async fn build_document(root_id: &str, options: &BuildOptions) -> Result<SchemaDocument> {
    let resolution = ImportLoader::new(options)?.resolve(root_id).await?;

    let definitions = Merger::from_options(options)
        .merge(resolution.into_documents())
        .await?;

    Ok(schema::Document { definitions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn options(sources: MemorySources) -> BuildOptions {
        BuildOptions::new()
            .base_dir("/virtual")
            .load_plugin(Arc::new(sources))
    }

    #[tokio::test]
    async fn test_build_document_merges_imports() {
        let sources = MemorySources::new()
            .with_source(
                "file:///virtual/schema.graphql",
                "# import User from \"./user.graphql\"\ntype Query { me: User }\ntype User { id: ID! }",
            )
            .with_source(
                "file:///virtual/user.graphql",
                "type User { name: String }",
            );

        let document = build_document("./schema.graphql", &options(sources))
            .await
            .unwrap();
        let names: Vec<_> = document
            .definitions
            .iter()
            .filter_map(model::definition_name)
            .collect();
        assert_eq!(names, vec!["Query", "User"]);

        let sdl = document.to_string();
        assert!(sdl.contains("id: ID!"));
        assert!(sdl.contains("name: String"));
    }

    #[tokio::test]
    async fn test_build_document_empty_root() {
        let sources = MemorySources::new().with_source("file:///virtual/empty.graphql", "   \n");
        let document = build_document("./empty.graphql", &options(sources))
            .await
            .unwrap();
        assert!(document.definitions.is_empty());
    }

    #[test]
    fn test_error_messages() {
        let err = Error::KindMismatch {
            name: None,
            incoming: DefinitionKind::Interface,
            survivor: DefinitionKind::Object,
        };
        assert_eq!(
            err.to_string(),
            "Unable to merge of types \"InterfaceTypeDefinition\" and \"ObjectTypeDefinition\""
        );

        let err = Error::UnsupportedProtocol {
            protocol: "https".to_string(),
            id: "https://example.com/a.graphql".to_string(),
        };
        assert!(err.to_string().starts_with("Unsupported protocol « https »"));
    }
}
