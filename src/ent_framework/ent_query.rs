// Entity Query Builder - Turns a structured option set into SQL over the entities table
// Every predicate either narrows the query or fails the whole read

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::ent_framework::entity::{Entity, EntityType};
use crate::ent_framework::subtype_registry::{SubtypeRegistry, NO_SUBTYPE};
use crate::error::{AppError, AppResult};
use crate::infrastructure::access::AccessControl;
use crate::infrastructure::database::Guid;
use crate::infrastructure::viewer::ViewerContext;

pub const DEFAULT_ORDER_BY: &str = "e.time_created desc";

static COLUMN_LIST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)?(\s+(asc|desc))?(\s*,\s*[a-z_][a-z0-9_]*(\.[a-z_][a-z0-9_]*)?(\s+(asc|desc))?)*\s*$",
    )
    .expect("column list pattern is valid")
});

/// One requested subtype. `NoSubtype` matches entities stored without one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubtypeFilter {
    Named(String),
    NoSubtype,
}

impl From<&str> for SubtypeFilter {
    fn from(subtype: &str) -> Self {
        SubtypeFilter::Named(subtype.to_string())
    }
}

impl From<String> for SubtypeFilter {
    fn from(subtype: String) -> Self {
        SubtypeFilter::Named(subtype)
    }
}

/// A type with an optional list of subtypes; `None` matches any subtype of the type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSubtypePair {
    pub entity_type: String,
    pub subtypes: Option<Vec<SubtypeFilter>>,
}

/// Integer-valued option as supplied by the caller. Text must parse as an integer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IntValue {
    Int(i64),
    Text(String),
}

impl IntValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            IntValue::Int(value) => Some(*value),
            IntValue::Text(text) => text.trim().parse().ok(),
        }
    }
}

impl From<i64> for IntValue {
    fn from(value: i64) -> Self {
        IntValue::Int(value)
    }
}

impl From<&str> for IntValue {
    fn from(value: &str) -> Self {
        IntValue::Text(value.to_string())
    }
}

/// Restricts results to entities carrying a private setting, optionally with a given value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateSettingFilter {
    pub name: String,
    pub value: Option<String>,
}

/// Option set for entity reads
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityQuery {
    pub types: Vec<String>,
    pub subtypes: Vec<SubtypeFilter>,
    /// Takes precedence over `types` and `subtypes` when non-empty
    pub type_subtype_pairs: Vec<TypeSubtypePair>,
    pub owner_guids: Option<Vec<IntValue>>,
    pub container_guids: Option<Vec<IntValue>>,
    pub site_guids: Option<Vec<IntValue>>,
    pub created_time_lower: Option<IntValue>,
    pub created_time_upper: Option<IntValue>,
    pub modified_time_lower: Option<IntValue>,
    pub modified_time_upper: Option<IntValue>,
    pub wheres: Vec<String>,
    pub joins: Vec<String>,
    pub selects: Vec<String>,
    pub private_settings: Vec<PrivateSettingFilter>,
    /// `None` orders by creation time, newest first; an empty string disables ordering
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    /// `None` uses the configured page size; `Some(0)` returns everything
    pub limit: Option<u32>,
    pub offset: u32,
    pub count: bool,
}

impl EntityQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type<S: Into<String>>(mut self, entity_type: S) -> Self {
        self.types.push(entity_type.into());
        self
    }

    pub fn with_subtype<S: Into<SubtypeFilter>>(mut self, subtype: S) -> Self {
        self.subtypes.push(subtype.into());
        self
    }

    pub fn with_no_subtype(mut self) -> Self {
        self.subtypes.push(SubtypeFilter::NoSubtype);
        self
    }

    pub fn with_pair<S: Into<String>>(mut self, entity_type: S, subtypes: Option<Vec<SubtypeFilter>>) -> Self {
        self.type_subtype_pairs.push(TypeSubtypePair {
            entity_type: entity_type.into(),
            subtypes,
        });
        self
    }

    pub fn with_owner<V: Into<IntValue>>(mut self, owner: V) -> Self {
        self.owner_guids.get_or_insert_with(Vec::new).push(owner.into());
        self
    }

    pub fn with_container<V: Into<IntValue>>(mut self, container: V) -> Self {
        self.container_guids
            .get_or_insert_with(Vec::new)
            .push(container.into());
        self
    }

    pub fn with_site<V: Into<IntValue>>(mut self, site: V) -> Self {
        self.site_guids.get_or_insert_with(Vec::new).push(site.into());
        self
    }

    pub fn created_after<V: Into<IntValue>>(mut self, time: V) -> Self {
        self.created_time_lower = Some(time.into());
        self
    }

    pub fn created_before<V: Into<IntValue>>(mut self, time: V) -> Self {
        self.created_time_upper = Some(time.into());
        self
    }

    pub fn modified_after<V: Into<IntValue>>(mut self, time: V) -> Self {
        self.modified_time_lower = Some(time.into());
        self
    }

    pub fn modified_before<V: Into<IntValue>>(mut self, time: V) -> Self {
        self.modified_time_upper = Some(time.into());
        self
    }

    pub fn with_where<S: Into<String>>(mut self, clause: S) -> Self {
        self.wheres.push(clause.into());
        self
    }

    pub fn with_join<S: Into<String>>(mut self, join: S) -> Self {
        self.joins.push(join.into());
        self
    }

    pub fn with_select<S: Into<String>>(mut self, select: S) -> Self {
        self.selects.push(select.into());
        self
    }

    pub fn with_private_setting<S: Into<String>>(mut self, name: S, value: Option<&str>) -> Self {
        self.private_settings.push(PrivateSettingFilter {
            name: name.into(),
            value: value.map(str::to_string),
        });
        self
    }

    pub fn order_by<S: Into<String>>(mut self, order_by: S) -> Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn group_by<S: Into<String>>(mut self, group_by: S) -> Self {
        self.group_by = Some(group_by.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = offset;
        self
    }

    pub fn count(mut self) -> Self {
        self.count = true;
        self
    }
}

/// Result of a read: a page of entities, or a total in count mode
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Entities(Vec<Entity>),
    Count(i64),
}

/// Quotes a string literal for SQLite
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn invalid<T>(message: String) -> AppResult<T> {
    warn!("{}", message);
    Err(AppError::InvalidQuery(message))
}

/// Joins and predicates shared by list, count and date queries
struct QueryParts {
    joins: Vec<String>,
    wheres: Vec<String>,
}

pub struct EntityQueryBuilder<'a> {
    registry: &'a SubtypeRegistry,
    access: &'a dyn AccessControl,
    default_limit: u32,
}

impl<'a> EntityQueryBuilder<'a> {
    pub fn new(registry: &'a SubtypeRegistry, access: &'a dyn AccessControl, default_limit: u32) -> Self {
        Self {
            registry,
            access,
            default_limit,
        }
    }

    /// Type/subtype restriction for the query, `None` when nothing was requested
    pub async fn type_subtype_predicate(&self, query: &EntityQuery) -> AppResult<Option<String>> {
        if !query.subtypes.is_empty() && query.types.is_empty() {
            return invalid("Cannot set subtypes without a type".to_string());
        }

        if query.type_subtype_pairs.is_empty() && query.types.is_empty() {
            return Ok(None);
        }

        let pairs: Vec<TypeSubtypePair> = if !query.type_subtype_pairs.is_empty() {
            query.type_subtype_pairs.clone()
        } else {
            let subtypes = if query.subtypes.is_empty() {
                None
            } else {
                Some(query.subtypes.clone())
            };
            dedup_non_empty(query.types.clone())
                .into_iter()
                .map(|entity_type| TypeSubtypePair {
                    entity_type,
                    subtypes: subtypes.clone(),
                })
                .collect()
        };

        let mut valid_pairs = Vec::new();
        for pair in pairs {
            match EntityType::from_name(&pair.entity_type) {
                Some(entity_type) => valid_pairs.push((entity_type, pair.subtypes)),
                None => warn!("Dropping invalid entity type {}", pair.entity_type),
            }
        }
        if valid_pairs.is_empty() {
            return invalid("No valid entity types requested".to_string());
        }

        let mut valid_subtypes: usize = valid_pairs
            .iter()
            .map(|(_, subtypes)| subtypes.as_ref().map_or(0, Vec::len))
            .sum();
        let any_subtypes_requested = valid_subtypes > 0;
        let mut has_type_only_clause = false;
        let mut clauses = Vec::new();

        for (entity_type, subtypes) in valid_pairs {
            let subtypes = match subtypes {
                Some(subtypes) if !subtypes.is_empty() => subtypes,
                _ => {
                    has_type_only_clause = true;
                    clauses.push(format!("(e.type = '{}')", entity_type));
                    continue;
                }
            };

            let mut ids = Vec::new();
            for subtype in &subtypes {
                let id = match subtype {
                    SubtypeFilter::NoSubtype => Some(NO_SUBTYPE),
                    SubtypeFilter::Named(name) => self.registry.resolve_id(entity_type, name).await?,
                };
                match id {
                    Some(id) => {
                        if !ids.contains(&id) {
                            ids.push(id);
                        }
                    }
                    None => {
                        valid_subtypes -= 1;
                        if let SubtypeFilter::Named(name) = subtype {
                            warn!("Type-subtype {}:{} does not exist", entity_type, name);
                        }
                    }
                }
            }

            if !ids.is_empty() {
                let ids = ids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
                clauses.push(format!(
                    "(e.type = '{}' AND e.subtype IN ({}))",
                    entity_type, ids
                ));
            }
        }

        if any_subtypes_requested && valid_subtypes == 0 && !has_type_only_clause {
            return invalid("None of the requested subtypes exist".to_string());
        }

        if clauses.is_empty() {
            return Ok(None);
        }
        Ok(Some(format!("({})", clauses.join(" OR "))))
    }

    /// `(e.<column> IN (...))` for a scalar-or-list guid option. 0 is a valid guid.
    pub fn guid_predicate(column: &str, values: Option<&Vec<IntValue>>) -> AppResult<Option<String>> {
        let Some(values) = values else {
            return Ok(None);
        };

        let mut guids: Vec<Guid> = Vec::with_capacity(values.len());
        for value in values {
            match value.as_int() {
                Some(guid) => guids.push(guid),
                None => return invalid(format!("{} must be an integer, got {:?}", column, value)),
            }
        }

        if guids.is_empty() {
            return Ok(None);
        }

        let list = guids.iter().map(i64::to_string).collect::<Vec<_>>().join(",");
        Ok(Some(format!("(e.{} IN ({}))", column, list)))
    }

    pub fn time_predicate(query: &EntityQuery) -> AppResult<Option<String>> {
        let bounds = [
            ("time_created", "<=", &query.created_time_upper),
            ("time_created", ">=", &query.created_time_lower),
            ("time_updated", "<=", &query.modified_time_upper),
            ("time_updated", ">=", &query.modified_time_lower),
        ];

        let mut wheres = Vec::new();
        for (column, op, bound) in bounds {
            if let Some(bound) = bound {
                match bound.as_int() {
                    Some(time) => wheres.push(format!("e.{} {} {}", column, op, time)),
                    None => return invalid(format!("{} bound must be an integer, got {:?}", column, bound)),
                }
            }
        }

        if wheres.is_empty() {
            Ok(None)
        } else {
            Ok(Some(format!("({})", wheres.join(" AND "))))
        }
    }

    fn private_setting_parts(query: &EntityQuery) -> QueryParts {
        let mut parts = QueryParts {
            joins: Vec::new(),
            wheres: Vec::new(),
        };

        for (i, filter) in query.private_settings.iter().enumerate() {
            let alias = format!("ps{}", i);
            parts.joins.push(format!(
                "JOIN private_settings {alias} ON e.guid = {alias}.entity_guid"
            ));
            let mut clause = format!("({alias}.name = {}", quote(&filter.name));
            if let Some(value) = &filter.value {
                clause.push_str(&format!(" AND {alias}.value = {}", quote(value)));
            }
            clause.push(')');
            parts.wheres.push(clause);
        }

        parts
    }

    async fn parts(&self, query: &EntityQuery) -> AppResult<QueryParts> {
        let mut wheres: Vec<String> = Vec::new();

        let predicates = [
            self.type_subtype_predicate(query).await?,
            Self::guid_predicate("owner_guid", query.owner_guids.as_ref())?,
            Self::guid_predicate("container_guid", query.container_guids.as_ref())?,
            Self::guid_predicate("site_guid", query.site_guids.as_ref())?,
            Self::time_predicate(query)?,
        ];
        wheres.extend(predicates.into_iter().flatten());

        let settings = Self::private_setting_parts(query);
        wheres.extend(settings.wheres);
        // Caller clauses are parenthesized so an OR inside one cannot escape the access clause
        wheres.extend(
            query
                .wheres
                .iter()
                .map(|clause| clause.trim())
                .filter(|clause| !clause.is_empty())
                .map(|clause| format!("({})", clause)),
        );

        let mut joins: Vec<String> = query.joins.clone();
        joins.extend(settings.joins);

        Ok(QueryParts {
            joins: dedup_non_empty(joins),
            wheres: dedup_non_empty(wheres),
        })
    }

    fn validated_clause(kind: &str, clause: &str) -> AppResult<()> {
        if COLUMN_LIST.is_match(clause) {
            Ok(())
        } else {
            invalid(format!("Unsupported {} clause: {}", kind, clause))
        }
    }

    fn append_from(&self, sql: &mut String, viewer: &ViewerContext, parts: &QueryParts) {
        for join in &parts.joins {
            sql.push(' ');
            sql.push_str(join);
        }
        sql.push_str(" WHERE ");
        for clause in &parts.wheres {
            sql.push_str(clause);
            sql.push_str(" AND ");
        }
        sql.push('(');
        sql.push_str(&self.access.sql_predicate(viewer, "e"));
        sql.push(')');
    }

    /// Full SQL for a list or count query
    pub async fn build(&self, viewer: &ViewerContext, query: &EntityQuery) -> AppResult<String> {
        let parts = self.parts(query).await?;

        if query.count {
            let mut sql = "SELECT COUNT(DISTINCT e.guid) AS total FROM entities e".to_string();
            self.append_from(&mut sql, viewer, &parts);
            return Ok(sql);
        }

        let selects: String = dedup_non_empty(query.selects.clone())
            .iter()
            .map(|select| format!(", {}", select))
            .collect();
        let mut sql = format!("SELECT DISTINCT e.*{} FROM entities e", selects);
        self.append_from(&mut sql, viewer, &parts);

        if let Some(group_by) = query.group_by.as_deref().filter(|g| !g.trim().is_empty()) {
            Self::validated_clause("group_by", group_by)?;
            sql.push_str(&format!(" GROUP BY {}", group_by.trim()));
        }

        let order_by = query.order_by.as_deref().unwrap_or(DEFAULT_ORDER_BY);
        if !order_by.trim().is_empty() {
            Self::validated_clause("order_by", order_by)?;
            sql.push_str(&format!(" ORDER BY {}", order_by.trim()));
        }

        let limit = query.limit.unwrap_or(self.default_limit);
        if limit > 0 {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, query.offset));
        }

        Ok(sql)
    }

    /// Distinct `YYYYMM` creation months of the matching entities, oldest first
    pub async fn build_dates(&self, viewer: &ViewerContext, query: &EntityQuery) -> AppResult<String> {
        let parts = self.parts(query).await?;
        let mut sql = "SELECT DISTINCT strftime('%Y%m', e.time_created, 'unixepoch') AS yearmonth FROM entities e"
            .to_string();
        self.append_from(&mut sql, viewer, &parts);
        sql.push_str(" ORDER BY yearmonth");
        Ok(sql)
    }
}

fn dedup_non_empty(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(items.len());
    for item in items {
        let trimmed = item.trim();
        if !trimmed.is_empty() && !out.iter().any(|existing| existing == trimmed) {
            out.push(trimmed.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::access::DefaultAccessControl;
    use crate::infrastructure::sqlite_database::SqliteDatabase;
    use std::sync::Arc;

    async fn registry() -> SubtypeRegistry {
        let db = SqliteDatabase::new_in_memory().await.unwrap();
        let registry = SubtypeRegistry::new(Arc::new(db));
        registry
            .register_subtype(EntityType::Object, "blogpost", "")
            .await
            .unwrap();
        registry
            .register_subtype(EntityType::Object, "page", "")
            .await
            .unwrap();
        registry
    }

    #[tokio::test]
    async fn test_subtypes_without_types_fail() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let query = EntityQuery::new().with_subtype("blogpost");

        assert!(matches!(
            builder.type_subtype_predicate(&query).await,
            Err(AppError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_nothing_requested_is_unrestricted() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        assert_eq!(builder.type_subtype_predicate(&EntityQuery::new()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_types_are_dropped() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);

        let query = EntityQuery::new().with_type("widget").with_type("user").with_type("user");
        assert_eq!(
            builder.type_subtype_predicate(&query).await.unwrap().as_deref(),
            Some("((e.type = 'user'))")
        );

        let query = EntityQuery::new().with_type("widget");
        assert!(builder.type_subtype_predicate(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_subtypes_resolve_to_ids() {
        let registry = registry().await;
        let blogpost = registry.resolve_id(EntityType::Object, "blogpost").await.unwrap().unwrap();
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);

        let query = EntityQuery::new()
            .with_type("object")
            .with_subtype("blogpost")
            .with_subtype("missing")
            .with_no_subtype();
        assert_eq!(
            builder.type_subtype_predicate(&query).await.unwrap(),
            Some(format!("((e.type = 'object' AND e.subtype IN ({},0)))", blogpost))
        );
    }

    #[tokio::test]
    async fn test_only_missing_subtypes_fail() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let query = EntityQuery::new().with_type("object").with_subtype("missing");
        assert!(builder.type_subtype_predicate(&query).await.is_err());
    }

    #[tokio::test]
    async fn test_type_without_resolved_subtypes_is_skipped() {
        let registry = registry().await;
        let page = registry.resolve_id(EntityType::Object, "page").await.unwrap().unwrap();
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);

        let query = EntityQuery::new()
            .with_type("object")
            .with_type("group")
            .with_subtype("page");
        assert_eq!(
            builder.type_subtype_predicate(&query).await.unwrap(),
            Some(format!("((e.type = 'object' AND e.subtype IN ({})))", page))
        );
    }

    #[tokio::test]
    async fn test_pairs_take_precedence() {
        let registry = registry().await;
        let page = registry.resolve_id(EntityType::Object, "page").await.unwrap().unwrap();
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);

        let query = EntityQuery::new()
            .with_type("site")
            .with_pair("object", Some(vec!["page".into(), "ghost".into()]))
            .with_pair("user", None);
        assert_eq!(
            builder.type_subtype_predicate(&query).await.unwrap(),
            Some(format!(
                "((e.type = 'object' AND e.subtype IN ({})) OR (e.type = 'user'))",
                page
            ))
        );

        let query = EntityQuery::new()
            .with_pair("object", Some(vec!["ghost".into()]))
            .with_pair("user", None);
        assert_eq!(
            builder.type_subtype_predicate(&query).await.unwrap().as_deref(),
            Some("((e.type = 'user'))")
        );
    }

    #[test]
    fn test_guid_predicates() {
        let owners = vec![IntValue::from(0), IntValue::from("12")];
        assert_eq!(
            EntityQueryBuilder::guid_predicate("owner_guid", Some(&owners)).unwrap().as_deref(),
            Some("(e.owner_guid IN (0,12))")
        );
        assert_eq!(EntityQueryBuilder::guid_predicate("owner_guid", None).unwrap(), None);

        let bad = vec![IntValue::from("12; DROP TABLE entities")];
        assert!(EntityQueryBuilder::guid_predicate("owner_guid", Some(&bad)).is_err());
    }

    #[test]
    fn test_time_predicate() {
        let query = EntityQuery::new().created_after(100).modified_before("200");
        assert_eq!(
            EntityQueryBuilder::time_predicate(&query).unwrap().as_deref(),
            Some("(e.time_created >= 100 AND e.time_updated <= 200)")
        );

        let query = EntityQuery::new().created_before("yesterday");
        assert!(EntityQueryBuilder::time_predicate(&query).is_err());
    }

    #[tokio::test]
    async fn test_full_query_assembly() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let query = EntityQuery::new()
            .with_type("user")
            .with_owner(5)
            .with_join("JOIN users_entity u ON u.guid = e.guid")
            .with_join("JOIN users_entity u ON u.guid = e.guid")
            .with_where("u.guid > 0")
            .with_where("u.guid > 0")
            .offset(20);

        let sql = builder.build(&ViewerContext::anonymous(), &query).await.unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT e.* FROM entities e JOIN users_entity u ON u.guid = e.guid \
             WHERE ((e.type = 'user')) AND (e.owner_guid IN (5)) AND (u.guid > 0) AND \
             ((e.access_id IN (2)) AND e.enabled = 'yes') \
             ORDER BY e.time_created desc LIMIT 10 OFFSET 20"
        );
    }

    #[tokio::test]
    async fn test_count_mode_skips_paging() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let query = EntityQuery::new().with_type("object").count().limit(3);

        let sql = builder.build(&ViewerContext::admin(1), &query).await.unwrap();
        assert_eq!(
            sql,
            "SELECT COUNT(DISTINCT e.guid) AS total FROM entities e WHERE ((e.type = 'object')) AND (1 = 1 AND e.enabled = 'yes')"
        );
    }

    #[tokio::test]
    async fn test_order_by_is_validated() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let viewer = ViewerContext::anonymous();

        let ok = EntityQuery::new().order_by("e.guid ASC, e.time_updated desc").limit(0);
        let sql = builder.build(&viewer, &ok).await.unwrap();
        assert!(sql.ends_with("ORDER BY e.guid ASC, e.time_updated desc"));

        let unordered = EntityQuery::new().order_by("");
        assert!(!builder.build(&viewer, &unordered).await.unwrap().contains("ORDER BY"));

        let bad = EntityQuery::new().order_by("e.guid; DELETE FROM entities");
        assert!(matches!(
            builder.build(&viewer, &bad).await,
            Err(AppError::InvalidQuery(_))
        ));
    }

    #[tokio::test]
    async fn test_free_form_or_stays_inside_access_clause() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let query = EntityQuery::new()
            .with_where("e.guid > 0 OR e.guid = 1")
            .with_where("  ")
            .limit(0)
            .order_by("");

        let sql = builder.build(&ViewerContext::anonymous(), &query).await.unwrap();
        assert_eq!(
            sql,
            "SELECT DISTINCT e.* FROM entities e \
             WHERE (e.guid > 0 OR e.guid = 1) AND ((e.access_id IN (2)) AND e.enabled = 'yes')"
        );
    }

    #[tokio::test]
    async fn test_private_setting_filters_are_escaped() {
        let registry = registry().await;
        let builder = EntityQueryBuilder::new(&registry, &DefaultAccessControl, 10);
        let query = EntityQuery::new().with_private_setting("motto", Some("it's fine"));

        let sql = builder.build(&ViewerContext::anonymous(), &query).await.unwrap();
        assert!(sql.contains("JOIN private_settings ps0 ON e.guid = ps0.entity_guid"));
        assert!(sql.contains("(ps0.name = 'motto' AND ps0.value = 'it''s fine')"));
    }
}
