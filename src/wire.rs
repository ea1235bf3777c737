use std::fmt::Debug;
use std::io;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::stream;
use futures::Sink;
use pgwire::api::auth::cleartext::CleartextPasswordAuthStartupHandler;
use pgwire::api::auth::{DefaultServerParameterProvider, StartupHandler};
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldFormat, FieldInfo,
    QueryResponse, Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use pgwire::tokio::TlsAcceptor;
use tokio::net::TcpStream;

use crate::auth::HallresAuthSource;
use crate::engine::{Engine, EngineError};
use crate::model::*;
use crate::observability::{command_label, QUERIES_TOTAL, QUERY_DURATION_SECONDS};
use crate::session::{RoleLookup, SessionContext};
use crate::sql::{self, Command, SqlError};
use crate::tenant::TenantManager;

pub struct HallresHandler {
    tenant_manager: Arc<TenantManager>,
    roles: Arc<dyn RoleLookup>,
    query_parser: Arc<HallresQueryParser>,
}

impl HallresHandler {
    pub fn new(tenant_manager: Arc<TenantManager>, roles: Arc<dyn RoleLookup>) -> Self {
        Self {
            tenant_manager,
            roles,
            query_parser: Arc::new(HallresQueryParser),
        }
    }

    fn resolve_engine<C: ClientInfo>(&self, client: &C) -> PgWireResult<Arc<Engine>> {
        let db = client
            .metadata()
            .get("database")
            .cloned()
            .unwrap_or_else(|| "default".to_string());
        self.tenant_manager.get_or_create(&db).map_err(|e| {
            PgWireError::UserError(Box::new(ErrorInfo::new(
                "ERROR".into(),
                "08006".into(),
                format!("tenant error: {e}"),
            )))
        })
    }

    /// The login user is the requester's email; the role comes from the lookup.
    fn session<C: ClientInfo>(&self, client: &C) -> SessionContext {
        let email = client.metadata().get("user").cloned().unwrap_or_default();
        SessionContext::resolve(&email, self.roles.as_ref())
    }

    async fn run<C: ClientInfo>(&self, client: &C, query: &str) -> PgWireResult<Response> {
        let engine = self.resolve_engine(client)?;
        let ctx = self.session(client);
        let cmd = sql::parse_sql(query).map_err(sql_err)?;

        let label = command_label(&cmd);
        let started = Instant::now();
        let result = execute_command(&engine, &ctx, cmd).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(QUERIES_TOTAL, "command" => label, "status" => status).increment(1);
        metrics::histogram!(QUERY_DURATION_SECONDS, "command" => label).record(started.elapsed().as_secs_f64());
        result.map_err(engine_err)
    }
}

async fn execute_command(engine: &Engine, ctx: &SessionContext, cmd: Command) -> Result<Response, EngineError> {
    match cmd {
        Command::SubmitRequest(req) => {
            let record = engine.submit_request(ctx, req).await?;
            Ok(record_rows(vec![record]))
        }
        Command::ApproveRequest { id } => {
            let record = engine.approve_request(ctx, id).await?;
            Ok(record_rows(vec![record]))
        }
        Command::RejectRequest { id } => {
            engine.reject_request(ctx, id).await?;
            Ok(Response::Execution(Tag::new("DELETE").with_rows(1)))
        }
        Command::SelectAvailability { hall, date } => {
            let day = engine.day_availability(&hall, date).await?;
            let schema = Arc::new(availability_schema());
            let rows: Vec<PgWireResult<_>> = day
                .slots
                .iter()
                .map(|(slot, status)| {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&day.hall)?;
                    encoder.encode_field(&format_date(day.date))?;
                    encoder.encode_field(&slot.code())?;
                    encoder.encode_field(&slot.label())?;
                    encoder.encode_field(&status.as_str())?;
                    Ok(encoder.take_row())
                })
                .collect();
            Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
        }
        Command::SelectHalls { date } => {
            let halls = engine.halls_on(date).await;
            let schema = Arc::new(halls_schema());
            let rows: Vec<PgWireResult<_>> = halls
                .iter()
                .map(|h| {
                    let mut encoder = DataRowEncoder::new(schema.clone());
                    encoder.encode_field(&h.hall_id)?;
                    encoder.encode_field(&h.name)?;
                    encoder.encode_field(&h.location)?;
                    encoder.encode_field(&(h.capacity as i32))?;
                    encoder.encode_field(&h.fully_booked)?;
                    Ok(encoder.take_row())
                })
                .collect();
            Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
        }
        Command::SelectRequests { email } => {
            let email = match email {
                Some(e) => Some(own_email(ctx, e)?),
                None if ctx.is_admin() => None,
                None => Some(ctx.email.clone()),
            };
            let mut pending = engine.pending_requests().await;
            if let Some(email) = email {
                pending.retain(|r| r.requester.email.eq_ignore_ascii_case(&email));
            }
            Ok(record_rows(pending))
        }
        Command::SelectBookings { on, from, hall, email } => {
            let from = on
                .into_iter()
                .chain(from)
                .max()
                .unwrap_or_else(|| chrono::Local::now().date_naive());
            let mut bookings = engine.upcoming_bookings(from, hall.as_deref()).await;
            if let Some(on) = on {
                bookings.retain(|r| r.date == on);
            }
            if let Some(email) = email {
                bookings.retain(|r| r.requester.email.eq_ignore_ascii_case(&email));
            }
            Ok(record_rows(bookings))
        }
        Command::SelectDashboard { email } => {
            let email = match email {
                Some(e) => own_email(ctx, e)?,
                None => ctx.email.clone(),
            };
            Ok(record_rows(engine.records_for_requester(&email).await))
        }
    }
}

/// Faculty may only name themselves; administrators may name anyone.
fn own_email(ctx: &SessionContext, email: String) -> Result<String, EngineError> {
    if ctx.is_admin() || email.eq_ignore_ascii_case(&ctx.email) {
        Ok(email)
    } else {
        Err(EngineError::Forbidden("listing another requester's records"))
    }
}

fn text_field(name: &str) -> FieldInfo {
    FieldInfo::new(name.into(), None, None, Type::VARCHAR, FieldFormat::Text)
}

fn availability_schema() -> Vec<FieldInfo> {
    ["hall", "date", "slot", "label", "status"]
        .into_iter()
        .map(text_field)
        .collect()
}

fn halls_schema() -> Vec<FieldInfo> {
    vec![
        text_field("hall"),
        text_field("name"),
        text_field("location"),
        FieldInfo::new("capacity".into(), None, None, Type::INT4, FieldFormat::Text),
        FieldInfo::new("fully_booked".into(), None, None, Type::BOOL, FieldFormat::Text),
    ]
}

fn record_schema() -> Vec<FieldInfo> {
    [
        "id",
        "hall",
        "date",
        "slot",
        "status",
        "event_name",
        "name",
        "email",
        "department",
        "designation",
        "phone",
    ]
    .into_iter()
    .map(text_field)
    .collect()
}

fn record_rows(records: Vec<ReservationRecord>) -> Response {
    let schema = Arc::new(record_schema());
    let rows: Vec<PgWireResult<_>> = records
        .iter()
        .map(|r| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&r.id.to_string())?;
            encoder.encode_field(&r.hall)?;
            encoder.encode_field(&format_date(r.date))?;
            encoder.encode_field(&r.slot.stored_form())?;
            encoder.encode_field(&r.status.as_str())?;
            encoder.encode_field(&r.event_name)?;
            encoder.encode_field(&r.requester.name)?;
            encoder.encode_field(&r.requester.email)?;
            encoder.encode_field(&r.requester.department)?;
            encoder.encode_field(&r.requester.designation)?;
            encoder.encode_field(&r.requester.phone)?;
            Ok(encoder.take_row())
        })
        .collect();
    Response::Query(QueryResponse::new(schema, stream::iter(rows)))
}

/// Result columns a statement will produce, judged from its text alone so
/// statements with unbound `$n` placeholders can be described.
fn result_schema(sql: &str) -> Vec<FieldInfo> {
    let normalized = sql.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase();
    let is_select = normalized.starts_with("SELECT");
    if is_select && normalized.contains("FROM AVAILABILITY") {
        availability_schema()
    } else if is_select && normalized.contains("FROM HALLS") {
        halls_schema()
    } else if (is_select && (normalized.contains("FROM REQUESTS")
            || normalized.contains("FROM BOOKINGS")
            || normalized.contains("FROM DASHBOARD")))
        || normalized.starts_with("INSERT INTO REQUESTS")
        || normalized.starts_with("INSERT INTO BOOKINGS")
    {
        record_schema()
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for HallresHandler {
    async fn do_query<C>(
        &self,
        client: &mut C,
        query: &str,
    ) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(client, query).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct HallresQueryParser;

#[async_trait]
impl QueryParser for HallresQueryParser {
    type Statement = String;

    async fn parse_sql<C>(
        &self,
        _client: &C,
        sql: &str,
        _types: &[Option<Type>],
    ) -> PgWireResult<String>
    where
        C: ClientInfo + Unpin + Send + Sync,
    {
        Ok(sql.to_string())
    }

    fn get_parameter_types(&self, stmt: &String) -> PgWireResult<Vec<Type>> {
        Ok(vec![Type::VARCHAR; count_params(stmt)])
    }

    fn get_result_schema(
        &self,
        stmt: &String,
        _column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(stmt))
    }
}

#[async_trait]
impl ExtendedQueryHandler for HallresHandler {
    type Statement = String;
    type QueryParser = HallresQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        client: &mut C,
        portal: &Portal<Self::Statement>,
        _max_rows: usize,
    ) -> PgWireResult<Response>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let sql = substitute_params(portal);
        self.run(client, &sql).await
    }

    async fn do_describe_statement<C>(
        &self,
        _client: &mut C,
        target: &StoredStatement<Self::Statement>,
    ) -> PgWireResult<DescribeStatementResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        let param_types = vec![Type::VARCHAR; count_params(&target.statement)];
        Ok(DescribeStatementResponse::new(param_types, result_schema(&target.statement)))
    }

    async fn do_describe_portal<C>(
        &self,
        _client: &mut C,
        target: &Portal<Self::Statement>,
    ) -> PgWireResult<DescribePortalResponse>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::PortalStore: PortalStore<Statement = Self::Statement>,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(DescribePortalResponse::new(result_schema(&target.statement.statement)))
    }
}

/// Highest `$N` placeholder in the statement.
fn count_params(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }
        i += 1;
        let start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if let Ok(n) = sql[start..i].parse::<usize>() {
            max = max.max(n);
        }
    }
    max
}

/// Inline bound text parameters as quoted literals, highest index first so
/// `$1` never clobbers the prefix of `$10`.
fn substitute_params(portal: &Portal<String>) -> String {
    let mut sql = portal.statement.statement.clone();
    for (i, param) in portal.parameters.iter().enumerate().rev() {
        let value = match param {
            Some(bytes) => format!("'{}'", String::from_utf8_lossy(bytes).replace('\'', "''")),
            None => "NULL".to_string(),
        };
        sql = sql.replace(&format!("${}", i + 1), &value);
    }
    sql
}

// ── Factory ──────────────────────────────────────────────────────

pub struct HallresFactory {
    handler: Arc<HallresHandler>,
    auth_handler:
        Arc<CleartextPasswordAuthStartupHandler<HallresAuthSource, DefaultServerParameterProvider>>,
    noop: Arc<NoopHandler>,
}

impl HallresFactory {
    pub fn new(tenant_manager: Arc<TenantManager>, password: String, roles: Arc<dyn RoleLookup>) -> Self {
        let auth_source = HallresAuthSource::new(password);
        let param_provider = DefaultServerParameterProvider::default();
        Self {
            handler: Arc::new(HallresHandler::new(tenant_manager, roles)),
            auth_handler: Arc::new(CleartextPasswordAuthStartupHandler::new(
                auth_source,
                param_provider,
            )),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for HallresFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.auth_handler.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes.
pub async fn process_connection(
    socket: TcpStream,
    tenant_manager: Arc<TenantManager>,
    password: String,
    roles: Arc<dyn RoleLookup>,
    tls: Option<TlsAcceptor>,
) -> io::Result<()> {
    let factory = Arc::new(HallresFactory::new(tenant_manager, password, roles));
    pgwire::tokio::process_socket(socket, tls, factory).await
}

fn sqlstate(e: &EngineError) -> &'static str {
    match e {
        EngineError::StaleConflict { .. } => "40001",
        EngineError::Forbidden(_) => "42501",
        EngineError::NotFound(_) => "P0002",
        EngineError::StoreUnavailable(_) => "58030",
        _ => "P0001",
    }
}

fn engine_err(e: EngineError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: SqlError) -> PgWireError {
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        "42601".into(),
        e.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_params_finds_highest() {
        assert_eq!(count_params("SELECT * FROM halls"), 0);
        assert_eq!(count_params("SELECT * FROM availability WHERE hall = $1 AND date = $2"), 2);
        assert_eq!(count_params("INSERT INTO requests VALUES ($3, $1, $10)"), 10);
    }

    #[test]
    fn schemas_by_statement() {
        assert_eq!(result_schema("select * from  availability where hall = $1").len(), 5);
        assert_eq!(result_schema("SELECT * FROM halls WHERE date = $1").len(), 5);
        assert_eq!(result_schema("SELECT * FROM bookings").len(), 11);
        assert_eq!(result_schema("SELECT * FROM dashboard WHERE email = $1").len(), 11);
        assert_eq!(result_schema("INSERT INTO requests (hall) VALUES ($1)").len(), 11);
        assert_eq!(result_schema("insert into bookings (request_id) values ($1)").len(), 11);
        assert!(result_schema("DELETE FROM requests WHERE id = $1").is_empty());
    }

    #[test]
    fn error_codes() {
        let code = |e: EngineError| sqlstate(&e);
        assert_eq!(
            code(EngineError::StaleConflict {
                hall: "emerald".into(),
                date: parse_date("2025-03-10").unwrap(),
                slot: Slot::Forenoon,
                status: SlotStatus::Booked,
            }),
            "40001"
        );
        assert_eq!(code(EngineError::Forbidden("approve")), "42501");
        assert_eq!(code(EngineError::NotFound(ulid::Ulid::new())), "P0002");
        assert_eq!(code(EngineError::StoreUnavailable("disk".into())), "58030");
        assert_eq!(code(EngineError::UnknownHall("x".into())), "P0001");
        assert_eq!(code(EngineError::PastDate(parse_date("2001-01-01").unwrap())), "P0001");
    }
}
