use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use dispatch_core::CoreError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::{require_dialer_token, require_operator_token};
use crate::error::ApiError;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let dialer = Router::new()
        .route("/dialer/next-batch", get(next_batch))
        .route("/dialer/report-result", post(report_result))
        .route("/dialer/register-scenarios", post(register_scenarios))
        .route(
            "/dialer/register-outbound-lines",
            post(register_outbound_lines),
        )
        .route("/sms/ingest", get(sms_ingest))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_dialer_token,
        ));

    let operator = Router::new()
        .route(
            "/tenants/:slug/billing/transactions",
            get(list_transactions),
        )
        .route("/tenants/:slug/numbers", get(list_numbers))
        .route("/tenants/:slug/wallet/adjust", post(adjust_wallet))
        .route("/tenants/:slug/wallet/match", post(match_bank_sms))
        .route(
            "/tenants/:slug/schedule",
            get(get_schedule).patch(update_schedule),
        )
        .route("/tenants/:slug/schedule/windows", post(set_windows))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            require_operator_token,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(dialer)
        .merge(operator)
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    let ok = sqlx::query("select 1").execute(&state.pool).await.is_ok();
    Json(HealthResponse { ok })
}

async fn resolve_tenant_by_slug(pool: &dispatch_db::PgPool, slug: &str) -> Result<Uuid, CoreError> {
    sqlx::query_as::<_, (Uuid,)>("select id from tenants where slug = $1")
        .bind(slug)
        .fetch_optional(pool)
        .await
        .map_err(CoreError::from)?
        .map(|(id,)| id)
        .ok_or_else(|| CoreError::not_found(format!("tenant {slug}")))
}

async fn resolve_tenant_by_company(pool: &dispatch_db::PgPool, company: &str) -> Result<Uuid, CoreError> {
    resolve_tenant_by_slug(pool, company).await
}

// ---- GET /dialer/next-batch ----

#[derive(Deserialize)]
struct NextBatchQuery {
    company: String,
    #[serde(default)]
    size: Option<u32>,
    #[serde(default)]
    active_lines_count: Option<u32>,
}

#[derive(Serialize)]
struct AgentSummary {
    id: Uuid,
    username: String,
    display_name: String,
    phone: Option<String>,
}

#[derive(Serialize)]
struct ScenarioSummary {
    id: Uuid,
    name: String,
    display_name: Option<String>,
}

#[derive(Serialize)]
struct OutboundLineSummary {
    id: Uuid,
    phone_number: String,
    display_name: Option<String>,
}

#[derive(Serialize)]
struct NextBatchResponse {
    call_allowed: bool,
    timezone: String,
    server_time: DateTime<Utc>,
    schedule_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after_seconds: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    batch: Option<dispatch_batch::ClaimedBatch>,
    active_scenarios: Vec<ScenarioSummary>,
    outbound_lines: Vec<OutboundLineSummary>,
    inbound_agents: Vec<AgentSummary>,
    outbound_agents: Vec<AgentSummary>,
}

async fn next_batch(
    State(state): State<AppState>,
    Query(q): Query<NextBatchQuery>,
) -> Result<Json<NextBatchResponse>, ApiError> {
    let tenant_id = resolve_tenant_by_company(&state.pool, &q.company).await?;

    let outcome = dispatch_batch::fetch_next_batch(
        &state.pool,
        tenant_id,
        q.size,
        q.active_lines_count,
        state.config.default_batch_size,
        state.config.max_batch_size,
        state.config.call_cooldown_days,
        state.config.assignment_timeout_minutes,
        state.config.short_retry_seconds,
        state.config.long_retry_seconds,
    )
    .await?;

    let scenarios: Vec<ScenarioSummary> = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
        "select id, name, display_name from scenarios where tenant_id = $1 and active = true",
    )
    .bind(tenant_id)
    .fetch_all(&state.pool)
    .await
    .map_err(CoreError::from)?
    .into_iter()
    .map(|(id, name, display_name)| ScenarioSummary { id, name, display_name })
    .collect();

    let outbound_lines: Vec<OutboundLineSummary> = sqlx::query_as::<_, (Uuid, String, Option<String>)>(
        "select id, phone_number, display_name from outbound_lines where tenant_id = $1 and active = true",
    )
    .bind(tenant_id)
    .fetch_all(&state.pool)
    .await
    .map_err(CoreError::from)?
    .into_iter()
    .map(|(id, phone_number, display_name)| OutboundLineSummary {
        id,
        phone_number,
        display_name,
    })
    .collect();

    let agents: Vec<dispatch_db::User> = sqlx::query_as(
        "select * from users where tenant_id = $1 and role = 'AGENT' and active = true",
    )
    .bind(tenant_id)
    .fetch_all(&state.pool)
    .await
    .map_err(CoreError::from)?;

    let to_summary = |u: &dispatch_db::User| AgentSummary {
        id: u.id,
        username: u.username.clone(),
        display_name: u.display_name(),
        phone: u.phone.clone(),
    };

    let inbound_agents = agents
        .iter()
        .filter(|u| matches!(u.agent_type.as_deref(), Some("INBOUND") | Some("BOTH")))
        .map(to_summary)
        .collect();
    let outbound_agents = agents
        .iter()
        .filter(|u| matches!(u.agent_type.as_deref(), Some("OUTBOUND") | Some("BOTH")))
        .map(to_summary)
        .collect();

    Ok(Json(NextBatchResponse {
        call_allowed: outcome.call_allowed,
        timezone: state.config.timezone.clone(),
        server_time: Utc::now(),
        schedule_version: outcome.schedule_version,
        reason: outcome.reason,
        retry_after_seconds: if outcome.call_allowed { None } else { Some(outcome.retry_after_seconds) },
        batch: outcome.batch,
        active_scenarios: scenarios,
        outbound_lines,
        inbound_agents,
        outbound_agents,
    }))
}

// ---- POST /dialer/report-result ----

#[derive(Deserialize)]
struct DialerReportRequest {
    number_id: Option<Uuid>,
    phone_number: String,
    company: String,
    scenario_id: Option<Uuid>,
    outbound_line_id: Option<Uuid>,
    status: String,
    reason: Option<String>,
    attempted_at: DateTime<Utc>,
    call_allowed: Option<bool>,
    batch_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    agent_phone: Option<String>,
}

#[derive(Serialize)]
struct ReportResultResponse {
    id: Uuid,
    global_status: String,
    phone_number: String,
}

async fn report_result(
    State(state): State<AppState>,
    Json(req): Json<DialerReportRequest>,
) -> Result<Json<ReportResultResponse>, ApiError> {
    let tenant_id = resolve_tenant_by_company(&state.pool, &req.company).await?;

    let report = dispatch_results::DialerReport {
        number_id: req.number_id,
        phone_number: req.phone_number,
        scenario_id: req.scenario_id,
        outbound_line_id: req.outbound_line_id,
        status: req.status,
        reason: req.reason,
        attempted_at: req.attempted_at,
        call_allowed: req.call_allowed,
        batch_id: req.batch_id,
        agent_id: req.agent_id,
        agent_phone: req.agent_phone,
    };

    let result = dispatch_results::report_result(&state.pool, tenant_id, report).await?;

    let (global_status, phone_number): (String, String) = sqlx::query_as(
        "select global_status, phone_number from numbers where id = $1",
    )
    .bind(result.number_id)
    .fetch_one(&state.pool)
    .await
    .map_err(CoreError::from)?;

    Ok(Json(ReportResultResponse {
        id: result.id,
        global_status,
        phone_number,
    }))
}

// ---- POST /dialer/register-scenarios ----

#[derive(Deserialize)]
struct ScenarioInput {
    name: String,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RegisterScenariosRequest {
    company: String,
    scenarios: Vec<ScenarioInput>,
}

#[derive(Serialize)]
struct RegisterCountsResponse {
    registered: usize,
}

async fn register_scenarios(
    State(state): State<AppState>,
    Json(req): Json<RegisterScenariosRequest>,
) -> Result<Json<RegisterCountsResponse>, ApiError> {
    let tenant_id = resolve_tenant_by_company(&state.pool, &req.company).await?;
    let mut registered = 0usize;
    for s in &req.scenarios {
        let rows = sqlx::query(
            "insert into scenarios (tenant_id, name, display_name) values ($1, $2, $3) \
             on conflict (tenant_id, name) do update set display_name = excluded.display_name",
        )
        .bind(tenant_id)
        .bind(&s.name)
        .bind(&s.display_name)
        .execute(&state.pool)
        .await
        .map_err(CoreError::from)?;
        registered += rows.rows_affected() as usize;
    }
    Ok(Json(RegisterCountsResponse { registered }))
}

// ---- POST /dialer/register-outbound-lines ----

#[derive(Deserialize)]
struct OutboundLineInput {
    phone_number: String,
    display_name: Option<String>,
}

#[derive(Deserialize)]
struct RegisterOutboundLinesRequest {
    company: String,
    outbound_lines: Vec<OutboundLineInput>,
}

async fn register_outbound_lines(
    State(state): State<AppState>,
    Json(req): Json<RegisterOutboundLinesRequest>,
) -> Result<Json<RegisterCountsResponse>, ApiError> {
    let tenant_id = resolve_tenant_by_company(&state.pool, &req.company).await?;
    let mut registered = 0usize;
    for l in &req.outbound_lines {
        let phone = dispatch_phone::normalize(&l.phone_number)
            .ok_or_else(|| CoreError::validation("invalid outbound line phone_number"))?;
        let rows = sqlx::query(
            "insert into outbound_lines (tenant_id, phone_number, display_name) values ($1, $2, $3) \
             on conflict (tenant_id, phone_number) do update set display_name = excluded.display_name",
        )
        .bind(tenant_id)
        .bind(&phone)
        .bind(&l.display_name)
        .execute(&state.pool)
        .await
        .map_err(CoreError::from)?;
        registered += rows.rows_affected() as usize;
    }
    Ok(Json(RegisterCountsResponse { registered }))
}

// ---- GET /sms/ingest ----

#[derive(Deserialize)]
struct SmsIngestQuery {
    from: String,
    #[serde(default)]
    #[allow(dead_code)]
    to: Option<String>,
    body: String,
}

#[derive(Serialize)]
struct SmsIngestResponse {
    ok: bool,
    stored: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Uuid>,
}

async fn sms_ingest(
    State(state): State<AppState>,
    Query(q): Query<SmsIngestQuery>,
) -> Result<Json<SmsIngestResponse>, ApiError> {
    if state.sms_limiter.check().is_err() {
        return Err(CoreError::conflict("sms ingest rate limit exceeded").into());
    }

    let row = dispatch_matcher::ingest_incoming_sms(
        &state.pool,
        &state.config.bank_profiles,
        &q.from,
        &q.body,
        &state.http,
    )
    .await?;

    Ok(Json(SmsIngestResponse {
        ok: true,
        stored: row.is_some(),
        id: row.map(|r| r.id),
    }))
}

// ---- operator: billing transactions ----

/// `from`/`to` are Jalali calendar days, `YYYY-MM-DD`, each expanded via
/// `jalali_day_range_to_utc` to its full Tehran-local UTC range rather
/// than accepting raw UTC instants.
#[derive(Deserialize)]
struct TransactionsQuery {
    from: Option<String>,
    to: Option<String>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

fn default_limit() -> i64 {
    50
}

fn parse_jalali_day(s: &str) -> Result<dispatch_calendar::JalaliDate, CoreError> {
    let mut parts = s.splitn(3, '-');
    let year: i32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| CoreError::validation("expected YYYY-MM-DD jalali date"))?;
    let month: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| CoreError::validation("expected YYYY-MM-DD jalali date"))?;
    let day: u32 = parts
        .next()
        .and_then(|p| p.parse().ok())
        .ok_or_else(|| CoreError::validation("expected YYYY-MM-DD jalali date"))?;
    Ok(dispatch_calendar::JalaliDate::new(year, month, day))
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<TransactionsQuery>,
) -> Result<Json<Vec<dispatch_db::WalletTransaction>>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;

    let from = q
        .from
        .as_deref()
        .map(parse_jalali_day)
        .transpose()?
        .and_then(|d| dispatch_calendar::jalali_day_range_to_utc(d))
        .map(|(start, _)| start);
    let to = q
        .to
        .as_deref()
        .map(parse_jalali_day)
        .transpose()?
        .and_then(|d| dispatch_calendar::jalali_day_range_to_utc(d))
        .map(|(_, end)| end);

    let txns = dispatch_billing::list_transactions(&state.pool, tenant_id, from, to, q.skip, q.limit)
        .await?;
    Ok(Json(txns))
}

// ---- operator: numbers ----

#[derive(Deserialize)]
struct NumbersQuery {
    status: Option<String>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

#[derive(Serialize)]
struct NumberWithLatestResult {
    #[serde(flatten)]
    number: dispatch_db::Number,
    latest_result: Option<dispatch_db::CallResult>,
}

async fn list_numbers(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Query(q): Query<NumbersQuery>,
) -> Result<Json<Vec<NumberWithLatestResult>>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;
    let numbers = sqlx::query_as::<_, dispatch_db::Number>(
        "select * from numbers where last_called_tenant = $1 \
         and ($2::text is null or global_status = $2) \
         order by updated_at desc offset $3 limit $4",
    )
    .bind(tenant_id)
    .bind(&q.status)
    .bind(q.skip)
    .bind(q.limit)
    .fetch_all(&state.pool)
    .await
    .map_err(CoreError::from)?;

    let mut out = Vec::with_capacity(numbers.len());
    for number in numbers {
        let latest_result: Option<dispatch_db::CallResult> = sqlx::query_as(
            "select * from call_results where tenant_id = $1 and number_id = $2 \
             order by attempted_at desc, id desc limit 1",
        )
        .bind(tenant_id)
        .bind(number.id)
        .fetch_optional(&state.pool)
        .await
        .map_err(CoreError::from)?;
        out.push(NumberWithLatestResult { number, latest_result });
    }
    Ok(Json(out))
}

// ---- operator: wallet adjust / match ----

#[derive(Deserialize)]
struct AdjustRequest {
    amount: i64,
    op: String,
    note: String,
}

async fn adjust_wallet(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<AdjustRequest>,
) -> Result<Json<dispatch_db::WalletTransaction>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;
    let op = match req.op.as_str() {
        "add" => dispatch_billing::AdjustOp::Add,
        "subtract" => dispatch_billing::AdjustOp::Subtract,
        other => return Err(CoreError::validation(format!("unknown adjust op {other}")).into()),
    };
    let txn =
        dispatch_billing::manual_adjust(&state.pool, tenant_id, req.amount, op, &req.note, None)
            .await?;
    Ok(Json(txn))
}

#[derive(Deserialize)]
struct MatchSmsRequest {
    amount_toman: i64,
    transaction_at: DateTime<Utc>,
}

async fn match_bank_sms(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<MatchSmsRequest>,
) -> Result<Json<dispatch_db::BankIncomingSms>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;
    let row = dispatch_matcher::match_and_charge(
        &state.pool,
        tenant_id,
        req.amount_toman,
        req.transaction_at,
    )
    .await?;
    Ok(Json(row))
}

// ---- operator: schedule ----

#[derive(Serialize)]
struct ScheduleResponse {
    config: dispatch_db::ScheduleConfig,
    call_allowed_now: bool,
}

async fn get_schedule(
    State(state): State<AppState>,
    Path(slug): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;
    let config = dispatch_schedule::ensure_config(&state.pool, tenant_id).await?;
    let call_allowed_now = dispatch_schedule::is_call_allowed(&state.pool, tenant_id).await?;
    Ok(Json(ScheduleResponse {
        config,
        call_allowed_now,
    }))
}

#[derive(Deserialize, Default)]
struct ScheduleUpdateRequest {
    enabled: Option<bool>,
    skip_holidays: Option<bool>,
    default_cost_per_connected: Option<i64>,
}

async fn update_schedule(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<ScheduleUpdateRequest>,
) -> Result<Json<dispatch_db::ScheduleConfig>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;
    let cfg = dispatch_schedule::update_schedule(
        &state.pool,
        tenant_id,
        dispatch_schedule::ScheduleUpdate {
            enabled: req.enabled,
            skip_holidays: req.skip_holidays,
            default_cost_per_connected: req.default_cost_per_connected,
        },
    )
    .await?;
    Ok(Json(cfg))
}

#[derive(Deserialize)]
struct WindowInput {
    weekday: i16,
    start_minute: i32,
    end_minute: i32,
}

#[derive(Deserialize)]
struct SetWindowsRequest {
    windows: Vec<WindowInput>,
}

async fn set_windows(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(req): Json<SetWindowsRequest>,
) -> Result<Json<Vec<dispatch_db::ScheduleWindow>>, ApiError> {
    let tenant_id = resolve_tenant_by_slug(&state.pool, &slug).await?;
    let windows = req
        .windows
        .into_iter()
        .map(|w| (w.weekday, w.start_minute, w.end_minute))
        .collect();
    let rows = dispatch_schedule::set_windows(&state.pool, tenant_id, windows).await?;
    Ok(Json(rows))
}
