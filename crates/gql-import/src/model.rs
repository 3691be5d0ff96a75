//! Import and definition model

use graphql_parser::schema::{self, TypeDefinition, TypeExtension};
use serde::Serialize;
use std::fmt;

/// An owned, parsed SDL document.
pub type SchemaDocument = schema::Document<'static, String>;

/// A single top-level definition of a [`SchemaDocument`].
pub type Definition = schema::Definition<'static, String>;

/// Which symbols an import directive asks for
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Requested {
    /// `#import * from '...'` or a directive without a `from` clause
    All,
    /// Named symbols in declaration order, without duplicates
    Symbols(Vec<String>),
}

impl Requested {
    /// Build from the raw symbol list of a directive
    pub fn from_list(list: Option<&str>) -> Self {
        match list.map(str::trim) {
            None | Some("*") => Self::All,
            Some(list) => {
                let mut symbols: Vec<String> = Vec::new();
                for symbol in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                    if !symbols.iter().any(|s| s == symbol) {
                        symbols.push(symbol.to_string());
                    }
                }
                if symbols.is_empty() {
                    Self::All
                } else {
                    Self::Symbols(symbols)
                }
            }
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }
}

/// A reference from one document to another.
///
/// `id` starts out as whatever the directive said and is replaced by the
/// canonical identifier once the resolver has run `resolve_id` on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportReference {
    pub requested: Requested,
    pub id: String,
}

impl ImportReference {
    pub fn new(requested: Requested, id: impl Into<String>) -> Self {
        Self {
            requested,
            id: id.into(),
        }
    }

    /// Import everything from `id`
    pub fn all(id: impl Into<String>) -> Self {
        Self::new(Requested::All, id)
    }
}

/// The outcome of loading one source: its imports and its definitions.
///
/// `document` is `None` when the source had nothing left after comment
/// stripping, or when a plugin answered with a placeholder.
#[derive(Debug, Clone, Default)]
pub struct ImportedDocument {
    pub imports: Vec<ImportReference>,
    pub document: Option<SchemaDocument>,
}

impl ImportedDocument {
    pub fn new(imports: Vec<ImportReference>, document: Option<SchemaDocument>) -> Self {
        Self { imports, document }
    }

    /// A document with no imports and no definitions
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of top-level definitions carried by this document
    pub fn definition_count(&self) -> usize {
        self.document
            .as_ref()
            .map_or(0, |document| document.definitions.len())
    }
}

/// What a `load` hook may hand back.
#[derive(Debug, Clone)]
pub enum LoadOutput {
    /// Raw SDL text, still containing import directives
    Source(String),
    /// An already scanned and parsed document
    Imported(ImportedDocument),
}

/// Structural category of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Schema,
    Scalar,
    Object,
    Interface,
    Union,
    Enum,
    InputObject,
    Directive,
    ScalarExtension,
    ObjectExtension,
    InterfaceExtension,
    UnionExtension,
    EnumExtension,
    InputObjectExtension,
}

impl DefinitionKind {
    /// Classify a parsed definition
    pub fn of(definition: &Definition) -> Self {
        match definition {
            schema::Definition::SchemaDefinition(_) => Self::Schema,
            schema::Definition::DirectiveDefinition(_) => Self::Directive,
            schema::Definition::TypeDefinition(definition) => match definition {
                TypeDefinition::Scalar(_) => Self::Scalar,
                TypeDefinition::Object(_) => Self::Object,
                TypeDefinition::Interface(_) => Self::Interface,
                TypeDefinition::Union(_) => Self::Union,
                TypeDefinition::Enum(_) => Self::Enum,
                TypeDefinition::InputObject(_) => Self::InputObject,
            },
            schema::Definition::TypeExtension(extension) => match extension {
                TypeExtension::Scalar(_) => Self::ScalarExtension,
                TypeExtension::Object(_) => Self::ObjectExtension,
                TypeExtension::Interface(_) => Self::InterfaceExtension,
                TypeExtension::Union(_) => Self::UnionExtension,
                TypeExtension::Enum(_) => Self::EnumExtension,
                TypeExtension::InputObject(_) => Self::InputObjectExtension,
            },
        }
    }

    /// The AST kind name, as GraphQL tooling spells it
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Schema => "SchemaDefinition",
            Self::Scalar => "ScalarTypeDefinition",
            Self::Object => "ObjectTypeDefinition",
            Self::Interface => "InterfaceTypeDefinition",
            Self::Union => "UnionTypeDefinition",
            Self::Enum => "EnumTypeDefinition",
            Self::InputObject => "InputObjectTypeDefinition",
            Self::Directive => "DirectiveDefinition",
            Self::ScalarExtension => "ScalarTypeExtension",
            Self::ObjectExtension => "ObjectTypeExtension",
            Self::InterfaceExtension => "InterfaceTypeExtension",
            Self::UnionExtension => "UnionTypeExtension",
            Self::EnumExtension => "EnumTypeExtension",
            Self::InputObjectExtension => "InputObjectTypeExtension",
        }
    }
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The name a definition is merged under, if it has one.
///
/// The schema definition is anonymous.
pub fn definition_name(definition: &Definition) -> Option<&str> {
    let name = match definition {
        schema::Definition::SchemaDefinition(_) => return None,
        schema::Definition::DirectiveDefinition(directive) => &directive.name,
        schema::Definition::TypeDefinition(definition) => match definition {
            TypeDefinition::Scalar(t) => &t.name,
            TypeDefinition::Object(t) => &t.name,
            TypeDefinition::Interface(t) => &t.name,
            TypeDefinition::Union(t) => &t.name,
            TypeDefinition::Enum(t) => &t.name,
            TypeDefinition::InputObject(t) => &t.name,
        },
        schema::Definition::TypeExtension(extension) => match extension {
            TypeExtension::Scalar(t) => &t.name,
            TypeExtension::Object(t) => &t.name,
            TypeExtension::Interface(t) => &t.name,
            TypeExtension::Union(t) => &t.name,
            TypeExtension::Enum(t) => &t.name,
            TypeExtension::InputObject(t) => &t.name,
        },
    };
    Some(name.as_str())
}
