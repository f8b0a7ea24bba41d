//! GET /topics/current - today's experiment day and topic.

use axum::Json;
use axum::extract::State;

use tutorlab_types::topic::Topic;

use crate::http::response::{ApiResponse, RequestTimer};
use crate::state::AppState;

pub async fn current_topic(State(state): State<AppState>) -> Json<ApiResponse<Topic>> {
    let timer = RequestTimer::start();
    let topic = state.calendar.topic_for(state.clock.today());
    Json(timer.success(topic))
}
