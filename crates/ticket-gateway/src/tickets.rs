//! Read-only routes over the per-site ticket tables.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use ticket_db::DecodedRecord;
use tracing::{info, warn};

use crate::server::{parse_id, ApiError, AppState};

const TICKET_NOT_FOUND: &str = "Ticket no encontrado";

/// One ticket table and the fixed statements used against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TicketTable {
    pub slug: &'static str,
    pub label: &'static str,
    list_sql: &'static str,
    by_number_sql: &'static str,
}

pub const TICKET_TABLES: [TicketTable; 4] = [
    TicketTable {
        slug: "antigua",
        label: "Antigua",
        list_sql: "SELECT * FROM antigua_Ticket",
        by_number_sql: "SELECT * FROM antigua_Ticket WHERE Number = ?",
    },
    TicketTable {
        slug: "dominica",
        label: "Dominica",
        list_sql: "SELECT * FROM dominica_Ticket",
        by_number_sql: "SELECT * FROM dominica_Ticket WHERE Number = ?",
    },
    TicketTable {
        slug: "maartin",
        label: "Maartin",
        list_sql: "SELECT * FROM maartin_Ticket",
        by_number_sql: "SELECT * FROM maartin_Ticket WHERE Number = ?",
    },
    TicketTable {
        slug: "thomas",
        label: "Thomas",
        list_sql: "SELECT * FROM Thomas_Ticket",
        by_number_sql: "SELECT * FROM Thomas_Ticket WHERE Number = ?",
    },
];

pub(crate) fn routes() -> Router<Arc<AppState>> {
    TICKET_TABLES
        .into_iter()
        .fold(Router::new(), |router, table| {
            router
                .route(
                    &format!("/api/{}_tickets", table.slug),
                    get(move |state: State<Arc<AppState>>| list_tickets(state, table)),
                )
                .route(
                    &format!("/api/{}_tickets/:number", table.slug),
                    get(move |state: State<Arc<AppState>>, number: Path<String>| {
                        get_ticket(state, number, table)
                    }),
                )
        })
}

async fn list_tickets(
    State(state): State<Arc<AppState>>,
    table: TicketTable,
) -> Result<Json<Vec<DecodedRecord>>, ApiError> {
    info!(table = table.slug, "ticket list requested");
    let tickets = state.db.read(table.list_sql, &[]).await.map_err(|err| {
        state.storage_error(
            &format!("Error al obtener los tickets de {}", table.label),
            err,
        )
    })?;
    Ok(Json(tickets))
}

async fn get_ticket(
    State(state): State<Arc<AppState>>,
    Path(number): Path<String>,
    table: TicketTable,
) -> Result<Json<DecodedRecord>, ApiError> {
    let number = parse_id(&number, TICKET_NOT_FOUND)?;
    info!(table = table.slug, number, "ticket requested");
    let rows = state
        .db
        .read(table.by_number_sql, &[number.into()])
        .await
        .map_err(|err| {
            state.storage_error(
                &format!("Error al obtener el ticket de {}", table.label),
                err,
            )
        })?;

    match rows.into_iter().next() {
        Some(ticket) => Ok(Json(ticket)),
        None => {
            warn!(table = table.slug, number, "ticket not found");
            Err(ApiError::not_found(TICKET_NOT_FOUND))
        }
    }
}
