//! Parking space API endpoints.

use axum::{
    Extension, Json,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
};
use entities::{
    HistoryAction, ParkingHistory, ParkingSpace, ParkingSpaceUpdate, ParkingStats,
    SectionSummary, group_by_section,
};
use parking_store::ParkingStore;
use serde::Deserialize;

use crate::error::{ServerError, ServerResult};
use crate::middleware::CurrentUser;
use crate::state::SharedState;
use crate::validation::{
    CreateSpaceRequest, UpdateSpaceRequest, parse_history_limit, parse_space_id,
};

/// Query parameters for stats.
#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    pub section: Option<String>,
}

/// Query parameters for history.
#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<String>,
}

/// Lists all spaces in grid order.
pub async fn list_spaces<S: ParkingStore>(
    State(state): State<SharedState<S>>,
) -> ServerResult<Json<Vec<ParkingSpace>>> {
    Ok(Json(state.store.get_all_parking_spaces().await?))
}

/// Creates a space.
pub async fn create_space<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    Extension(user): Extension<CurrentUser>,
    payload: Result<Json<CreateSpaceRequest>, JsonRejection>,
) -> ServerResult<(StatusCode, Json<ParkingSpace>)> {
    let Json(request) = payload?;
    let new_space = request.validate()?;

    let space = state.store.create_parking_space(new_space).await?;
    state
        .store
        .add_parking_history(space.id, HistoryAction::Created, Some(user.id))
        .await?;

    tracing::info!(
        space_id = space.id,
        space_number = %space.space_number,
        user_id = user.id,
        "Parking space created"
    );

    Ok((StatusCode::CREATED, Json(space)))
}

/// Applies a partial update to a space.
pub async fn update_space<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
    payload: Result<Json<UpdateSpaceRequest>, JsonRejection>,
) -> ServerResult<Json<ParkingSpace>> {
    let id = parse_space_id(&id)?;
    let Json(request) = payload?;
    let update = request.validate()?;

    let space = apply_update(&state, user, id, update).await?;

    Ok(Json(space))
}

/// Flips a space between available and occupied.
///
/// Spaces under maintenance are left untouched.
pub async fn toggle_space<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    Extension(user): Extension<CurrentUser>,
    Path(id): Path<String>,
) -> ServerResult<Json<ParkingSpace>> {
    let id = parse_space_id(&id)?;

    let space = state
        .store
        .get_parking_space(id)
        .await?
        .ok_or_else(|| ServerError::NotFound("Parking space not found".to_string()))?;

    let Some(next) = space.status.toggled() else {
        return Err(ServerError::Conflict(format!(
            "Parking space {} is under maintenance",
            space.space_number
        )));
    };

    // Only flips if nobody changed the status since it was read.
    let Some(space) = state
        .store
        .transition_parking_space(id, space.status, next)
        .await?
    else {
        return Err(ServerError::Conflict(format!(
            "Parking space {} changed status, reload and retry",
            space.space_number
        )));
    };
    state
        .store
        .add_parking_history(space.id, next.history_action(), Some(user.id))
        .await?;

    tracing::info!(
        space_id = space.id,
        status = %space.status,
        user_id = user.id,
        "Parking space toggled"
    );

    Ok(Json(space))
}

async fn apply_update<S: ParkingStore>(
    state: &SharedState<S>,
    user: CurrentUser,
    id: i64,
    update: ParkingSpaceUpdate,
) -> ServerResult<ParkingSpace> {
    let action = update.history_action();

    // Unknown ids fail here, before any history is written.
    let space = state.store.update_parking_space(id, update).await?;
    state
        .store
        .add_parking_history(space.id, action, Some(user.id))
        .await?;

    tracing::info!(
        space_id = space.id,
        status = %space.status,
        action = %action,
        user_id = user.id,
        "Parking space updated"
    );

    Ok(space)
}

/// Lists spaces grouped by section.
pub async fn list_sections<S: ParkingStore>(
    State(state): State<SharedState<S>>,
) -> ServerResult<Json<Vec<SectionSummary>>> {
    let spaces = state.store.get_all_parking_spaces().await?;
    Ok(Json(group_by_section(spaces)))
}

/// Occupancy statistics, optionally for one section.
pub async fn get_stats<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    Query(query): Query<StatsQuery>,
) -> ServerResult<Json<ParkingStats>> {
    let section = query.section.as_deref().filter(|s| !s.is_empty());
    Ok(Json(state.store.get_parking_stats(section).await?))
}

/// Most recent history entries.
pub async fn get_history<S: ParkingStore>(
    State(state): State<SharedState<S>>,
    Query(query): Query<HistoryQuery>,
) -> ServerResult<Json<Vec<ParkingHistory>>> {
    let limit = parse_history_limit(query.limit.as_deref())?;
    Ok(Json(state.store.get_recent_history(limit).await?))
}
