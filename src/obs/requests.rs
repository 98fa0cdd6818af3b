//! Typed wrappers for the OBS requests the daemon issues

use serde_json::{json, Value};

use super::{ObsError, Requester};

pub const MEDIA_ACTION_STOP: &str = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_STOP";
pub const MEDIA_ACTION_RESTART: &str = "OBS_WEBSOCKET_MEDIA_INPUT_ACTION_RESTART";

/// Snapshot returned by `GetMediaInputStatus`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaStatus {
    pub state: Option<String>,
    pub cursor_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub async fn get_scene_item_id(
    obs: &dyn Requester,
    scene_name: &str,
    source_name: &str,
) -> Result<Option<i64>, ObsError> {
    let data = obs
        .request(
            "GetSceneItemId",
            Some(json!({"sceneName": scene_name, "sourceName": source_name})),
            "getItemId",
        )
        .await?;
    Ok(data.get("sceneItemId").and_then(Value::as_i64))
}

pub async fn set_scene_item_enabled(
    obs: &dyn Requester,
    scene_name: &str,
    scene_item_id: i64,
    enabled: bool,
) -> Result<(), ObsError> {
    obs.request(
        "SetSceneItemEnabled",
        Some(json!({
            "sceneName": scene_name,
            "sceneItemId": scene_item_id,
            "sceneItemEnabled": enabled,
        })),
        if enabled { "enableItem" } else { "disableItem" },
    )
    .await?;
    Ok(())
}

pub async fn get_media_status(
    obs: &dyn Requester,
    input_name: &str,
) -> Result<MediaStatus, ObsError> {
    let data = obs
        .request(
            "GetMediaInputStatus",
            Some(json!({"inputName": input_name})),
            "getMedia",
        )
        .await?;

    Ok(MediaStatus {
        state: data.get("mediaState").and_then(Value::as_str).map(str::to_string),
        cursor_ms: data.get("mediaCursor").and_then(as_millis),
        duration_ms: data.get("mediaDuration").and_then(as_millis),
    })
}

pub async fn trigger_media_action(
    obs: &dyn Requester,
    input_name: &str,
    action: &str,
) -> Result<(), ObsError> {
    let prefix = if action == MEDIA_ACTION_STOP { "stopMedia" } else { "restartMedia" };
    obs.request(
        "TriggerMediaInputAction",
        Some(json!({"inputName": input_name, "mediaAction": action})),
        prefix,
    )
    .await?;
    Ok(())
}

/// Current mute flag of an input, `None` when OBS did not report one.
pub async fn get_input_mute(
    obs: &dyn Requester,
    input_name: &str,
    id_prefix: &str,
) -> Result<Option<bool>, ObsError> {
    let data = obs
        .request("GetInputMute", Some(json!({"inputName": input_name})), id_prefix)
        .await?;
    Ok(data.get("inputMuted").and_then(Value::as_bool))
}

pub async fn set_input_mute(
    obs: &dyn Requester,
    input_name: &str,
    muted: bool,
    id_prefix: &str,
) -> Result<(), ObsError> {
    obs.request(
        "SetInputMute",
        Some(json!({"inputName": input_name, "inputMuted": muted})),
        id_prefix,
    )
    .await?;
    Ok(())
}

/// Overlay the `text` setting of a text source.
pub async fn set_input_text(
    obs: &dyn Requester,
    input_name: &str,
    text: &str,
) -> Result<(), ObsError> {
    obs.request(
        "SetInputSettings",
        Some(json!({
            "inputName": input_name,
            "inputSettings": {"text": text},
            "overlay": true,
        })),
        "setText",
    )
    .await?;
    Ok(())
}

pub async fn get_current_program_scene(obs: &dyn Requester) -> Result<String, ObsError> {
    let data = obs.request("GetCurrentProgramScene", None, "getProgramScene").await?;
    data.get("currentProgramSceneName")
        .or_else(|| data.get("sceneName"))
        .and_then(Value::as_str)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ObsError::Protocol("no current program scene name".into()))
}
