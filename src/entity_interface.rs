// Entity Interface - HTTP surface over the entity store

use axum::{
    extract::{Path as AxumPath, Query, State},
    middleware,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::{
    ent_framework::{
        ent_builder::NewEntity,
        ent_query::{EntityQuery, IntValue, QueryOutcome, SubtypeFilter},
        ent_store::EntityStore,
        entity::{Entity, EntityType},
    },
    error::{AppError, AppResult},
    infrastructure::{
        database::Guid,
        middleware::{viewer_context_middleware, Vc},
    },
};

// HTTP Request/Response types
#[derive(Debug, Default, Deserialize)]
pub struct EntityListParams {
    /// Comma-separated type names
    pub types: Option<String>,
    /// Comma-separated subtype names
    pub subtypes: Option<String>,
    pub owner_guids: Option<String>,
    pub container_guids: Option<String>,
    pub site_guids: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub modified_after: Option<String>,
    pub modified_before: Option<String>,
    /// `name` or `name:value`
    pub private_setting: Option<String>,
    pub order_by: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub count: Option<bool>,
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn guid_list(raw: &Option<String>) -> Option<Vec<IntValue>> {
    raw.as_deref()
        .map(|raw| split_list(raw).into_iter().map(IntValue::Text).collect())
}

impl EntityListParams {
    pub fn to_query(&self) -> EntityQuery {
        let mut query = EntityQuery {
            types: self.types.as_deref().map(split_list).unwrap_or_default(),
            subtypes: self
                .subtypes
                .as_deref()
                .map(split_list)
                .unwrap_or_default()
                .into_iter()
                .map(SubtypeFilter::Named)
                .collect(),
            owner_guids: guid_list(&self.owner_guids),
            container_guids: guid_list(&self.container_guids),
            site_guids: guid_list(&self.site_guids),
            created_time_lower: self.created_after.clone().map(IntValue::Text),
            created_time_upper: self.created_before.clone().map(IntValue::Text),
            modified_time_lower: self.modified_after.clone().map(IntValue::Text),
            modified_time_upper: self.modified_before.clone().map(IntValue::Text),
            order_by: self.order_by.clone(),
            limit: self.limit,
            offset: self.offset.unwrap_or(0),
            count: self.count.unwrap_or(false),
            ..EntityQuery::default()
        };

        if let Some(setting) = &self.private_setting {
            query = match setting.split_once(':') {
                Some((name, value)) => query.with_private_setting(name, Some(value)),
                None => query.with_private_setting(setting.as_str(), None),
            };
        }
        query
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateEntityRequest {
    pub owner_guid: Guid,
    pub access_id: i64,
    pub container_guid: Option<Guid>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisableEntityRequest {
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteEntityParams {
    #[serde(default = "default_recursive")]
    pub recursive: bool,
}

fn default_recursive() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct SettingValueRequest {
    pub value: String,
}

#[derive(Debug, Deserialize)]
pub struct RegisterSubtypeRequest {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub subtype: String,
    #[serde(default)]
    pub class: String,
}

/// Loads an entity the viewer may edit, or explains why not
async fn editable_entity(store: &EntityStore, vc: &Vc, guid: Guid) -> AppResult<Entity> {
    let entity = store
        .load(vc, guid)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Entity {} not found", guid)))?;
    if !store.can_edit(vc, &entity, None).await? {
        return Err(AppError::Forbidden(format!("Cannot edit entity {}", guid)));
    }
    Ok(entity)
}

// HTTP Handlers

pub async fn list_entities_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    Query(params): Query<EntityListParams>,
) -> Result<Json<Value>, AppError> {
    match store.get_entities(&vc, &params.to_query()).await? {
        QueryOutcome::Entities(entities) => Ok(Json(json!({ "entities": entities }))),
        QueryOutcome::Count(total) => Ok(Json(json!({ "total": total }))),
    }
}

pub async fn entity_dates_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    Query(params): Query<EntityListParams>,
) -> Result<Json<Value>, AppError> {
    let dates = store.entity_dates(&vc, &params.to_query()).await?;
    Ok(Json(json!({ "dates": dates })))
}

pub async fn create_entity_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    Json(new): Json<NewEntity>,
) -> Result<Json<Value>, AppError> {
    match store.create(&vc, new).await? {
        Some(guid) => Ok(Json(json!({ "guid": guid }))),
        None => Err(AppError::Forbidden("Entity could not be created".to_string())),
    }
}

pub async fn get_entity_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath(guid): AxumPath<Guid>,
) -> Result<Json<Entity>, AppError> {
    store
        .load(&vc, guid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Entity {} not found", guid)))
}

pub async fn update_entity_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath(guid): AxumPath<Guid>,
    Json(req): Json<UpdateEntityRequest>,
) -> Result<Json<Value>, AppError> {
    let updated = store
        .update(&vc, guid, req.owner_guid, req.access_id, req.container_guid)
        .await?;
    Ok(Json(json!({ "guid": guid, "updated": updated })))
}

pub async fn delete_entity_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath(guid): AxumPath<Guid>,
    Query(params): Query<DeleteEntityParams>,
) -> Result<Json<Value>, AppError> {
    let deleted = store.delete(&vc, guid, params.recursive).await?;
    Ok(Json(json!({ "guid": guid, "deleted": deleted })))
}

pub async fn disable_entity_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath(guid): AxumPath<Guid>,
    Json(req): Json<DisableEntityRequest>,
) -> Result<Json<Value>, AppError> {
    let disabled = store.disable(&vc, guid, &req.reason, req.recursive).await?;
    Ok(Json(json!({ "guid": guid, "disabled": disabled })))
}

pub async fn enable_entity_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath(guid): AxumPath<Guid>,
) -> Result<Json<Value>, AppError> {
    let enabled = store.enable(&vc, guid).await?;
    Ok(Json(json!({ "guid": guid, "enabled": enabled })))
}

pub async fn get_settings_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath(guid): AxumPath<Guid>,
) -> Result<Json<Value>, AppError> {
    editable_entity(&store, &vc, guid).await?;
    let settings = store.get_all_private_settings(guid).await?;
    Ok(Json(json!({ "guid": guid, "settings": settings })))
}

pub async fn get_setting_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath((guid, name)): AxumPath<(Guid, String)>,
) -> Result<Json<Value>, AppError> {
    editable_entity(&store, &vc, guid).await?;
    let value = store
        .get_private_setting(guid, &name)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Setting {} not found", name)))?;
    Ok(Json(json!({ "name": name, "value": value })))
}

pub async fn set_setting_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath((guid, name)): AxumPath<(Guid, String)>,
    Json(req): Json<SettingValueRequest>,
) -> Result<Json<Value>, AppError> {
    editable_entity(&store, &vc, guid).await?;
    let saved = store.set_private_setting(guid, &name, &req.value).await?;
    Ok(Json(json!({ "name": name, "saved": saved })))
}

pub async fn remove_setting_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    AxumPath((guid, name)): AxumPath<(Guid, String)>,
) -> Result<Json<Value>, AppError> {
    editable_entity(&store, &vc, guid).await?;
    let removed = store.remove_private_setting(guid, &name).await?;
    Ok(Json(json!({ "name": name, "removed": removed })))
}

pub async fn register_subtype_handler(
    State(store): State<EntityStore>,
    vc: Vc,
    Json(req): Json<RegisterSubtypeRequest>,
) -> Result<Json<Value>, AppError> {
    if !vc.is_admin {
        return Err(AppError::Forbidden("Only admins can register subtypes".to_string()));
    }
    let entity_type = EntityType::from_name(&req.entity_type)
        .ok_or_else(|| AppError::Validation(format!("Unknown entity type: {}", req.entity_type)))?;
    let id = store
        .subtypes()
        .register_subtype(entity_type, &req.subtype, &req.class)
        .await?;
    Ok(Json(json!({ "id": id, "type": entity_type, "subtype": req.subtype })))
}

// Create entity router
pub fn create_entity_router(store: EntityStore) -> Router {
    Router::new()
        .route("/entities", get(list_entities_handler).post(create_entity_handler))
        .route(
            "/entities/{guid}",
            get(get_entity_handler)
                .put(update_entity_handler)
                .delete(delete_entity_handler),
        )
        .route("/entities/{guid}/disable", post(disable_entity_handler))
        .route("/entities/{guid}/enable", post(enable_entity_handler))
        .route("/entities/{guid}/settings", get(get_settings_handler))
        .route(
            "/entities/{guid}/settings/{name}",
            get(get_setting_handler)
                .put(set_setting_handler)
                .delete(remove_setting_handler),
        )
        .route("/dates", get(entity_dates_handler))
        .route("/subtypes", post(register_subtype_handler))
        .layer(middleware::from_fn(viewer_context_middleware))
        .with_state(store)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_params_to_query() {
        let params = EntityListParams {
            types: Some("object, user".to_string()),
            subtypes: Some("blogpost".to_string()),
            owner_guids: Some("10,11".to_string()),
            private_setting: Some("theme:dark".to_string()),
            limit: Some(5),
            ..EntityListParams::default()
        };
        let query = params.to_query();

        assert_eq!(query.types, vec!["object", "user"]);
        assert_eq!(query.subtypes, vec![SubtypeFilter::from("blogpost")]);
        assert_eq!(
            query.owner_guids,
            Some(vec![IntValue::from("10"), IntValue::from("11")])
        );
        assert_eq!(query.private_settings[0].value.as_deref(), Some("dark"));
        assert_eq!(query.limit, Some(5));
        assert!(!query.count);
    }
}
