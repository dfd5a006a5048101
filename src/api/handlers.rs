//! Request handlers for the API endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};

use super::types::{ApiError, ModeBody, StatusBody};
use crate::imitator::Imitator;
use crate::ups::params::{AlarmsUpdate, BatteryUpdate, ParamsUpdate, UpsParams};

type ApiResult<T> = Result<Json<T>, ApiError>;

/// `GET /imitator/mode` → 200 + `ModeBody`
pub async fn get_mode(State(imitator): State<Arc<Imitator>>) -> Json<ModeBody> {
    Json(ModeBody {
        mode: imitator.mode(),
    })
}

/// `PUT /imitator/mode` → 200 + `StatusBody`, 400 on a malformed body.
pub async fn put_mode(
    State(imitator): State<Arc<Imitator>>,
    body: Result<Json<ModeBody>, JsonRejection>,
) -> ApiResult<StatusBody> {
    let Json(body) = body?;
    imitator.set_mode(body.mode);
    Ok(Json(StatusBody::OK))
}

/// `GET /imitator/ups` → 200 + `UpsParams`
pub async fn get_ups(State(imitator): State<Arc<Imitator>>) -> Json<UpsParams> {
    Json(imitator.snapshot())
}

/// `PATCH /imitator/ups/params` → 200, 400, or 409 in auto mode.
pub async fn patch_params(
    State(imitator): State<Arc<Imitator>>,
    body: Result<Json<ParamsUpdate>, JsonRejection>,
) -> ApiResult<StatusBody> {
    let Json(update) = body?;
    ensure_manual(&imitator)?;
    imitator.update_params(&update);
    Ok(Json(StatusBody::OK))
}

/// `PATCH /imitator/ups/battery/{bat_id}` → 200, 400, 409 in auto mode,
/// or 422 for a slot that does not exist.
pub async fn patch_battery(
    State(imitator): State<Arc<Imitator>>,
    bat_id: Result<Path<usize>, PathRejection>,
    body: Result<Json<BatteryUpdate>, JsonRejection>,
) -> ApiResult<StatusBody> {
    let Path(bat_id) = bat_id?;
    let Json(update) = body?;
    ensure_manual(&imitator)?;
    imitator
        .update_battery(bat_id, &update)
        .map_err(|err| ApiError::Unprocessable(err.to_string()))?;
    Ok(Json(StatusBody::OK))
}

/// `PATCH /imitator/ups/alarms` → 200, 400, or 409 in auto mode.
pub async fn patch_alarms(
    State(imitator): State<Arc<Imitator>>,
    body: Result<Json<AlarmsUpdate>, JsonRejection>,
) -> ApiResult<StatusBody> {
    let Json(update) = body?;
    ensure_manual(&imitator)?;
    imitator.update_alarms(&update);
    Ok(Json(StatusBody::OK))
}

fn ensure_manual(imitator: &Imitator) -> Result<(), ApiError> {
    if imitator.mode() {
        return Err(ApiError::Conflict(
            "imitator is in auto mode; switch to manual mode before editing".to_string(),
        ));
    }
    Ok(())
}
