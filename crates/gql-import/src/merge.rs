//! Definition merging
//!
//! Folds the definitions of many documents into one table keyed by name.
//! Same-named definitions are reconciled by a per-kind conflict resolver,
//! after merge plugins have had a chance to answer instead.

use crate::config::BuildOptions;
use crate::model::{Definition, DefinitionKind, SchemaDocument, definition_name};
use crate::plugin::{self, MergePlugin};
use crate::{Error, Result};
use graphql_parser::schema::{
    self, Directive, EnumValue, Field, InputValue, TypeDefinition,
};
use indexmap::IndexMap;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// What to do when a merged type ends up with two members of the same name
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Fail with "defined multiple times"
    #[default]
    Reject,
    /// Keep the member seen first and drop the later one
    KeepFirst,
}

/// Reconciles an incoming definition with the survivor of the same kind.
///
/// Takes ownership of both and returns the new survivor.
pub type ConflictResolver =
    Arc<dyn Fn(Definition, Definition, DuplicatePolicy) -> Result<Definition> + Send + Sync>;

/// Conflict resolvers keyed by definition kind
#[derive(Clone)]
pub struct ResolverTable {
    resolvers: HashMap<DefinitionKind, ConflictResolver>,
    policy: DuplicatePolicy,
}

impl ResolverTable {
    /// The default resolvers
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self::empty(policy)
            .with_resolver(DefinitionKind::Object, merge_fields)
            .with_resolver(DefinitionKind::Interface, merge_fields)
            .with_resolver(DefinitionKind::InputObject, merge_fields)
            .with_resolver(DefinitionKind::Union, merge_fields)
            .with_resolver(DefinitionKind::Enum, merge_values)
            .with_resolver(DefinitionKind::Scalar, keep_survivor)
            .with_resolver(DefinitionKind::Directive, keep_survivor)
    }

    /// A table that resolves nothing
    pub fn empty(policy: DuplicatePolicy) -> Self {
        Self {
            resolvers: HashMap::new(),
            policy,
        }
    }

    /// Install or replace the resolver for `kind`
    pub fn with_resolver(
        mut self,
        kind: DefinitionKind,
        resolver: impl Fn(Definition, Definition, DuplicatePolicy) -> Result<Definition>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.resolvers.insert(kind, Arc::new(resolver));
        self
    }

    pub fn without_resolver(mut self, kind: DefinitionKind) -> Self {
        self.resolvers.remove(&kind);
        self
    }

    pub fn handles(&self, kind: DefinitionKind) -> bool {
        self.resolvers.contains_key(&kind)
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    /// Merge `incoming` into `survivor`.
    ///
    /// Fails when the kinds differ or no resolver handles the kind.
    pub fn resolve(&self, incoming: Definition, survivor: Definition) -> Result<Definition> {
        let incoming_kind = DefinitionKind::of(&incoming);
        let survivor_kind = DefinitionKind::of(&survivor);

        if incoming_kind != survivor_kind {
            return Err(Error::KindMismatch {
                name: definition_name(&incoming).map(str::to_string),
                incoming: incoming_kind,
                survivor: survivor_kind,
            });
        }

        match self.resolvers.get(&incoming_kind) {
            Some(resolver) => resolver(incoming, survivor, self.policy),
            None => Err(Error::NoResolver {
                kind: incoming_kind,
            }),
        }
    }
}

impl Default for ResolverTable {
    fn default() -> Self {
        Self::new(DuplicatePolicy::default())
    }
}

impl std::fmt::Debug for ResolverTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.resolvers.keys().map(DefinitionKind::as_str).collect();
        kinds.sort_unstable();
        f.debug_struct("ResolverTable")
            .field("kinds", &kinds)
            .field("policy", &self.policy)
            .finish()
    }
}

/// Something with a name inside a definition
trait Member {
    fn member_name(&self) -> &str;
}

impl Member for Field<'static, String> {
    fn member_name(&self) -> &str {
        &self.name
    }
}

impl Member for InputValue<'static, String> {
    fn member_name(&self) -> &str {
        &self.name
    }
}

impl Member for EnumValue<'static, String> {
    fn member_name(&self) -> &str {
        &self.name
    }
}

impl Member for Directive<'static, String> {
    fn member_name(&self) -> &str {
        &self.name
    }
}

impl Member for String {
    fn member_name(&self) -> &str {
        self
    }
}

/// Append incoming members after the survivor's, applying `policy` to
/// names that are already present
fn append_members<M: Member>(
    owner: &str,
    label: &'static str,
    survivor: &mut Vec<M>,
    incoming: Vec<M>,
    policy: DuplicatePolicy,
) -> Result<()> {
    let mut seen: HashSet<String> = survivor
        .iter()
        .map(|member| member.member_name().to_string())
        .collect();

    for member in incoming {
        if !seen.insert(member.member_name().to_string()) {
            match policy {
                DuplicatePolicy::Reject => {
                    return Err(Error::DuplicateMember {
                        member: label,
                        name: member.member_name().to_string(),
                        owner: owner.to_string(),
                    });
                }
                DuplicatePolicy::KeepFirst => {
                    debug!("Keeping first {} \"{}\" of {}", label, member.member_name(), owner);
                    continue;
                }
            }
        }
        survivor.push(member);
    }

    Ok(())
}

/// Append names not yet present; repeats are dropped silently
fn append_unique<M: Member>(survivor: &mut Vec<M>, incoming: Vec<M>) {
    let mut seen: HashSet<String> = survivor
        .iter()
        .map(|member| member.member_name().to_string())
        .collect();
    for member in incoming {
        if seen.insert(member.member_name().to_string()) {
            survivor.push(member);
        }
    }
}

/// Add incoming directives whose name the survivor does not carry yet
pub fn merge_directives(
    survivor: &mut Vec<Directive<'static, String>>,
    incoming: Vec<Directive<'static, String>>,
) {
    append_unique(survivor, incoming);
}

fn adopt_description(survivor: &mut Option<String>, incoming: Option<String>) {
    if survivor.is_none() {
        *survivor = incoming;
    }
}

/// Resolver for object, interface, input object and union types.
///
/// Directives are merged first, then the incoming fields (union members)
/// are appended after the survivor's.
pub fn merge_fields(
    incoming: Definition,
    survivor: Definition,
    policy: DuplicatePolicy,
) -> Result<Definition> {
    use schema::Definition::TypeDefinition as Type;

    let merged = match (survivor, incoming) {
        (Type(TypeDefinition::Object(mut survivor)), Type(TypeDefinition::Object(incoming))) => {
            merge_directives(&mut survivor.directives, incoming.directives);
            adopt_description(&mut survivor.description, incoming.description);
            append_unique(
                &mut survivor.implements_interfaces,
                incoming.implements_interfaces,
            );
            append_members(
                &survivor.name,
                "Field",
                &mut survivor.fields,
                incoming.fields,
                policy,
            )?;
            TypeDefinition::Object(survivor)
        }
        (
            Type(TypeDefinition::Interface(mut survivor)),
            Type(TypeDefinition::Interface(incoming)),
        ) => {
            merge_directives(&mut survivor.directives, incoming.directives);
            adopt_description(&mut survivor.description, incoming.description);
            append_members(
                &survivor.name,
                "Field",
                &mut survivor.fields,
                incoming.fields,
                policy,
            )?;
            TypeDefinition::Interface(survivor)
        }
        (
            Type(TypeDefinition::InputObject(mut survivor)),
            Type(TypeDefinition::InputObject(incoming)),
        ) => {
            merge_directives(&mut survivor.directives, incoming.directives);
            adopt_description(&mut survivor.description, incoming.description);
            append_members(
                &survivor.name,
                "Field",
                &mut survivor.fields,
                incoming.fields,
                policy,
            )?;
            TypeDefinition::InputObject(survivor)
        }
        (Type(TypeDefinition::Union(mut survivor)), Type(TypeDefinition::Union(incoming))) => {
            merge_directives(&mut survivor.directives, incoming.directives);
            adopt_description(&mut survivor.description, incoming.description);
            append_unique(&mut survivor.types, incoming.types);
            TypeDefinition::Union(survivor)
        }
        (_, incoming) => {
            return Err(Error::NoResolver {
                kind: DefinitionKind::of(&incoming),
            });
        }
    };

    Ok(Type(merged))
}

/// Resolver for enum types
pub fn merge_values(
    incoming: Definition,
    survivor: Definition,
    policy: DuplicatePolicy,
) -> Result<Definition> {
    use schema::Definition::TypeDefinition as Type;

    match (survivor, incoming) {
        (Type(TypeDefinition::Enum(mut survivor)), Type(TypeDefinition::Enum(incoming))) => {
            merge_directives(&mut survivor.directives, incoming.directives);
            adopt_description(&mut survivor.description, incoming.description);
            append_members(
                &survivor.name,
                "Enum value",
                &mut survivor.values,
                incoming.values,
                policy,
            )?;
            Ok(Type(TypeDefinition::Enum(survivor)))
        }
        (_, incoming) => Err(Error::NoResolver {
            kind: DefinitionKind::of(&incoming),
        }),
    }
}

/// Resolver for kinds that are never merged: the first definition stays
pub fn keep_survivor(
    _incoming: Definition,
    survivor: Definition,
    _policy: DuplicatePolicy,
) -> Result<Definition> {
    Ok(survivor)
}

/// Key of the merge table. Anonymous definitions never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum MergeKey {
    Named(String),
    Anonymous(usize),
}

/// Folds documents into a single ordered list of definitions
#[derive(Clone)]
pub struct Merger {
    plugins: Vec<Arc<dyn MergePlugin>>,
    resolvers: ResolverTable,
}

impl Merger {
    pub fn new(plugins: Vec<Arc<dyn MergePlugin>>, resolvers: ResolverTable) -> Self {
        Self { plugins, resolvers }
    }

    pub fn from_options(options: &BuildOptions) -> Self {
        Self::new(
            options.merge_plugins.clone(),
            ResolverTable::new(options.duplicate_policy),
        )
    }

    pub fn resolvers(&self) -> &ResolverTable {
        &self.resolvers
    }

    /// Merge all definitions, in document order.
    ///
    /// Definitions keep the position at which their name was first seen.
    /// Any conflict aborts the merge.
    pub async fn merge<I>(&self, documents: I) -> Result<Vec<Definition>>
    where
        I: IntoIterator<Item = SchemaDocument>,
    {
        let mut table: IndexMap<MergeKey, Definition> = IndexMap::new();
        let mut anonymous = 0;
        let mut merges = 0;

        for document in documents {
            for definition in document.definitions {
                let key = match definition_name(&definition) {
                    Some(name) => MergeKey::Named(name.to_string()),
                    None => {
                        anonymous += 1;
                        MergeKey::Anonymous(anonymous)
                    }
                };

                match table.shift_remove_full(&key) {
                    Some((index, key, survivor)) => {
                        debug!("Merging {:?} ({})", key, DefinitionKind::of(&definition));
                        let merged = self.merge_pair(definition, survivor).await?;
                        table.shift_insert(index, key, merged);
                        merges += 1;
                    }
                    None => {
                        table.insert(key, definition);
                    }
                }
            }
        }

        info!(
            "Merged into {} definition(s) ({} conflict(s) resolved)",
            table.len(),
            merges
        );

        Ok(table.into_values().collect())
    }

    /// Let plugins answer first, then fall back to the resolver table
    async fn merge_pair(&self, incoming: Definition, survivor: Definition) -> Result<Definition> {
        let produced = plugin::dispatch(&self.plugins, "merge_types", |plugin| {
            plugin.merge_types(&incoming, &survivor)
        })
        .await?;

        match produced {
            Some(merged) => Ok(merged),
            None => self.resolvers.resolve(incoming, survivor),
        }
    }
}

impl Default for Merger {
    fn default() -> Self {
        Self::new(Vec::new(), ResolverTable::default())
    }
}

impl std::fmt::Debug for Merger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Merger")
            .field(
                "plugins",
                &self.plugins.iter().map(|p| p.name()).collect::<Vec<_>>(),
            )
            .field("resolvers", &self.resolvers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::{HookFuture, Plugin, decline, produce};
    use graphql_parser::schema::parse_schema;

    fn doc(sdl: &str) -> SchemaDocument {
        parse_schema::<String>(sdl).unwrap().into_static()
    }

    fn first(sdl: &str) -> Definition {
        doc(sdl).definitions.remove(0)
    }

    fn object(definition: &Definition) -> &schema::ObjectType<'static, String> {
        match definition {
            schema::Definition::TypeDefinition(TypeDefinition::Object(object)) => object,
            other => panic!("Expected object type, got {:?}", other),
        }
    }

    fn field_names(definition: &Definition) -> Vec<&str> {
        object(definition)
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect()
    }

    fn directive_names(definition: &Definition) -> Vec<&str> {
        object(definition)
            .directives
            .iter()
            .map(|d| d.name.as_str())
            .collect()
    }

    async fn merge(sdls: &[&str]) -> Result<Vec<Definition>> {
        Merger::default().merge(sdls.iter().map(|sdl| doc(sdl))).await
    }

    #[tokio::test]
    async fn test_fields_appended_in_order() {
        let merged = merge(&["type User { name: String }", "type User { age: Int }"])
            .await
            .unwrap();
        assert_eq!(merged.len(), 1);
        assert_eq!(field_names(&merged[0]), vec!["name", "age"]);
    }

    #[tokio::test]
    async fn test_first_seen_order_preserved() {
        let merged = merge(&[
            "type A { a: ID } type B { b: ID }",
            "type C { c: ID } type A { a2: ID }",
        ])
        .await
        .unwrap();
        let names: Vec<_> = merged.iter().filter_map(definition_name).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(field_names(&merged[0]), vec!["a", "a2"]);
    }

    #[tokio::test]
    async fn test_kind_mismatch_rejected() {
        let err = merge(&["type Foo { id: ID }", "interface Foo { id: ID }"])
            .await
            .unwrap_err();
        match &err {
            Error::KindMismatch {
                name,
                incoming,
                survivor,
            } => {
                assert_eq!(name.as_deref(), Some("Foo"));
                assert_eq!(*incoming, DefinitionKind::Interface);
                assert_eq!(*survivor, DefinitionKind::Object);
            }
            e => panic!("Expected KindMismatch error, got {:?}", e),
        }
        assert_eq!(
            err.to_string(),
            "Unable to merge \"Foo\" of types \"InterfaceTypeDefinition\" and \"ObjectTypeDefinition\""
        );
    }

    #[tokio::test]
    async fn test_scalars_and_directives_not_merged() {
        let merged = merge(&[
            "scalar Date @specifiedBy(url: \"a\")\ndirective @auth on FIELD_DEFINITION",
            "scalar Date\ndirective @auth(role: String) on OBJECT",
        ])
        .await
        .unwrap();
        assert_eq!(merged.len(), 2);
        match &merged[1] {
            schema::Definition::DirectiveDefinition(directive) => {
                assert!(directive.arguments.is_empty());
            }
            other => panic!("Expected directive definition, got {:?}", other),
        }
        match &merged[0] {
            schema::Definition::TypeDefinition(TypeDefinition::Scalar(scalar)) => {
                assert_eq!(scalar.directives.len(), 1);
            }
            other => panic!("Expected scalar, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_type_directives_deduplicated() {
        let merged = merge(&[
            "type Old @deprecated { a: ID }",
            "type Old @deprecated @key(fields: \"a\") { b: ID }",
        ])
        .await
        .unwrap();
        assert_eq!(directive_names(&merged[0]), vec!["deprecated", "key"]);
    }

    #[tokio::test]
    async fn test_duplicate_field_rejected_by_default() {
        let err = merge(&["type User { id: ID }", "type User { id: ID! }"])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateMember { .. }));
        assert_eq!(
            err.to_string(),
            "Field \"id\" defined multiple times in \"User\""
        );
    }

    #[tokio::test]
    async fn test_duplicate_field_keep_first() {
        let merger = Merger::new(Vec::new(), ResolverTable::new(DuplicatePolicy::KeepFirst));
        let merged = merger
            .merge(vec![
                doc("type User { id: ID name: String }"),
                doc("type User { id: ID! email: String }"),
            ])
            .await
            .unwrap();
        assert_eq!(field_names(&merged[0]), vec!["id", "name", "email"]);
        let id = &object(&merged[0]).fields[0];
        assert!(matches!(&id.field_type, schema::Type::NamedType(name) if name == "ID"));
    }

    #[tokio::test]
    async fn test_enum_values_merged() {
        let merged = merge(&["enum Role { ADMIN }", "enum Role { USER GUEST }"])
            .await
            .unwrap();
        match &merged[0] {
            schema::Definition::TypeDefinition(TypeDefinition::Enum(role)) => {
                let values: Vec<_> = role.values.iter().map(|v| v.name.as_str()).collect();
                assert_eq!(values, vec!["ADMIN", "USER", "GUEST"]);
            }
            other => panic!("Expected enum, got {:?}", other),
        }

        let err = merge(&["enum Role { ADMIN }", "enum Role { ADMIN }"])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Enum value \"ADMIN\" defined multiple times in \"Role\""
        );
    }

    #[tokio::test]
    async fn test_union_members_and_inputs() {
        let merged = merge(&[
            "union Result = A | B\ninput Filter { a: ID }",
            "union Result = B | C\ninput Filter { b: ID }",
        ])
        .await
        .unwrap();
        match &merged[0] {
            schema::Definition::TypeDefinition(TypeDefinition::Union(union)) => {
                assert_eq!(union.types, vec!["A", "B", "C"]);
            }
            other => panic!("Expected union, got {:?}", other),
        }
        match &merged[1] {
            schema::Definition::TypeDefinition(TypeDefinition::InputObject(input)) => {
                let fields: Vec<_> = input.fields.iter().map(|f| f.name.as_str()).collect();
                assert_eq!(fields, vec!["a", "b"]);
            }
            other => panic!("Expected input object, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_survivor_adopts_incoming() {
        let merged = merge(&["type Query", "type Query @live { hello: String }"])
            .await
            .unwrap();
        assert_eq!(field_names(&merged[0]), vec!["hello"]);
        assert_eq!(directive_names(&merged[0]), vec!["live"]);
    }

    #[tokio::test]
    async fn test_interfaces_and_description() {
        let merged = merge(&[
            "type Node implements A { id: ID }",
            "\"\"\"A node\"\"\" type Node implements A & B { name: String }",
        ])
        .await
        .unwrap();
        let node = object(&merged[0]);
        assert_eq!(node.implements_interfaces, vec!["A", "B"]);
        assert_eq!(node.description.as_deref(), Some("A node"));
    }

    #[tokio::test]
    async fn test_schema_definitions_never_merged() {
        let merged = merge(&["schema { query: Query }", "schema { query: Query }"])
            .await
            .unwrap();
        assert_eq!(merged.len(), 2);
    }

    #[tokio::test]
    async fn test_extension_has_no_resolver() {
        let err = merge(&["extend type User { a: ID }", "extend type User { b: ID }"])
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "No resolver to resolve conflict with types \"ObjectTypeExtension\""
        );
    }

    #[tokio::test]
    async fn test_resolver_override() {
        let table = ResolverTable::default()
            .with_resolver(DefinitionKind::Scalar, |incoming, _survivor, _| Ok(incoming));
        let merger = Merger::new(Vec::new(), table);
        let merged = merger
            .merge(vec![doc("scalar Date"), doc("scalar Date @later")])
            .await
            .unwrap();
        match &merged[0] {
            schema::Definition::TypeDefinition(TypeDefinition::Scalar(scalar)) => {
                assert_eq!(scalar.directives[0].name, "later");
            }
            other => panic!("Expected scalar, got {:?}", other),
        }

        let merger = Merger::new(
            Vec::new(),
            ResolverTable::default().without_resolver(DefinitionKind::Object),
        );
        let err = merger
            .merge(vec![doc("type A { a: ID }"), doc("type A { b: ID }")])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NoResolver { kind: DefinitionKind::Object }));
    }

    /// Replaces the survivor with the incoming definition for objects only
    struct LastWins;

    impl Plugin for LastWins {}

    impl MergePlugin for LastWins {
        fn merge_types<'a>(
            &'a self,
            incoming: &'a Definition,
            _survivor: &'a Definition,
        ) -> HookFuture<'a, Definition> {
            match DefinitionKind::of(incoming) {
                DefinitionKind::Object => produce(incoming.clone()),
                _ => decline(),
            }
        }
    }

    #[tokio::test]
    async fn test_plugin_overrides_default() {
        let merger = Merger::new(vec![Arc::new(LastWins)], ResolverTable::default());
        let merged = merger
            .merge(vec![
                doc("type User { id: ID } enum E { A }"),
                doc("type User { id: ID! } enum E { B }"),
            ])
            .await
            .unwrap();
        assert_eq!(field_names(&merged[0]), vec!["id"]);
        assert!(matches!(
            object(&merged[0]).fields[0].field_type,
            schema::Type::NonNullType(_)
        ));
        match &merged[1] {
            schema::Definition::TypeDefinition(TypeDefinition::Enum(e)) => {
                assert_eq!(e.values.len(), 2);
            }
            other => panic!("Expected enum, got {:?}", other),
        }
    }
}
