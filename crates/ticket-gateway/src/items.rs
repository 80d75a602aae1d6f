//! CRUD routes for the `Items` table.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use ticket_db::{DecodedRecord, SqlParam};
use tracing::{error, info, warn};

use crate::server::{parse_id, ApiError, AppState};

const LIST_ITEMS: &str = "SELECT Id, Name, Description FROM Items";
const GET_ITEM: &str = "SELECT Id, Name, Description FROM Items WHERE Id = ?";
const INSERT_ITEM: &str = "INSERT INTO Items (Name, Description) VALUES (?, ?)";
const DELETE_ITEM: &str = "DELETE FROM Items WHERE Id = ?";

const ITEM_NOT_FOUND: &str = "Ítem no encontrado";

pub(crate) fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/items", get(list_items).post(create_item))
        .route(
            "/api/items/:id",
            get(get_item).put(update_item).delete(delete_item),
        )
}

/// Request body for create and update. Unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
struct ItemBody {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// Updatable fields and the columns they map to, in clause order.
const UPDATABLE: [(&str, &str); 2] = [("name", "Name"), ("description", "Description")];

impl ItemBody {
    fn field(&self, key: &str) -> Option<&str> {
        let value = match key {
            "name" => self.name.as_deref(),
            "description" => self.description.as_deref(),
            _ => None,
        };
        value.filter(|text| !text.is_empty())
    }

    /// Builds `UPDATE Items SET ... WHERE Id = ?` over the supplied fields.
    /// Returns `None` when there is nothing to update.
    fn update_statement(&self, id: i64) -> Option<(String, Vec<SqlParam>)> {
        let (assignments, mut params): (Vec<String>, Vec<SqlParam>) = UPDATABLE
            .iter()
            .filter_map(|(key, column)| {
                self.field(key)
                    .map(|value| (format!("{column} = ?"), SqlParam::from(value)))
            })
            .unzip();
        if assignments.is_empty() {
            return None;
        }
        params.push(id.into());
        Some((
            format!("UPDATE Items SET {} WHERE Id = ?", assignments.join(", ")),
            params,
        ))
    }
}

async fn list_items(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DecodedRecord>>, ApiError> {
    info!("item list requested");
    let items = state
        .db
        .read(LIST_ITEMS, &[])
        .await
        .map_err(|err| state.storage_error("Error al obtener los ítems", err))?;
    Ok(Json(items))
}

async fn get_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DecodedRecord>, ApiError> {
    let id = parse_id(&id, ITEM_NOT_FOUND)?;
    info!(id, "item requested");
    let rows = state
        .db
        .read(GET_ITEM, &[id.into()])
        .await
        .map_err(|err| state.storage_error("Error al obtener el ítem", err))?;

    rows.into_iter().next().map(Json).ok_or_else(|| {
        warn!(id, "item not found");
        ApiError::not_found(ITEM_NOT_FOUND)
    })
}

async fn create_item(
    State(state): State<Arc<AppState>>,
    body: Option<Json<ItemBody>>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let Some(name) = body.field("name").map(str::to_owned) else {
        warn!("item create rejected: name missing");
        return Err(ApiError::bad_request("Nombre del ítem es requerido"));
    };

    let params = [
        SqlParam::from(name.as_str()),
        SqlParam::from(body.description.clone()),
    ];
    let rows_affected = state
        .db
        .write(INSERT_ITEM, &params)
        .await
        .map_err(|err| state.storage_error("Error al añadir el ítem", err))?;

    if rows_affected > 0 {
        info!(%name, "item created");
        Ok((
            StatusCode::CREATED,
            Json(json!({ "message": "Ítem añadido exitosamente", "name": name })),
        ))
    } else {
        error!(%name, rows_affected, "item insert affected no rows");
        Err(ApiError::internal("No se pudo añadir el ítem"))
    }
}

async fn update_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    body: Option<Json<ItemBody>>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, ITEM_NOT_FOUND)?;
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let Some((statement, params)) = body.update_statement(id) else {
        warn!(id, "item update rejected: no fields supplied");
        return Err(ApiError::bad_request(
            "Proporcione al menos un campo (nombre o descripción) para actualizar",
        ));
    };

    let rows_affected = state
        .db
        .write(&statement, &params)
        .await
        .map_err(|err| state.storage_error("Error al actualizar el ítem", err))?;

    if rows_affected > 0 {
        info!(id, "item updated");
        Ok(Json(json!({ "message": "Ítem actualizado exitosamente" })))
    } else {
        warn!(id, "item not found for update");
        Err(ApiError::not_found(
            "Ítem no encontrado o no se realizaron cambios",
        ))
    }
}

async fn delete_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = parse_id(&id, ITEM_NOT_FOUND)?;
    let rows_affected = state
        .db
        .write(DELETE_ITEM, &[id.into()])
        .await
        .map_err(|err| state.storage_error("Error al eliminar el ítem", err))?;

    if rows_affected > 0 {
        info!(id, "item deleted");
        Ok(Json(json!({ "message": "Ítem eliminado exitosamente" })))
    } else {
        warn!(id, "item not found for delete");
        Err(ApiError::not_found(ITEM_NOT_FOUND))
    }
}
