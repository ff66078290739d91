use std::fmt::Debug;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat};
use futures::Sink;
use futures::stream;
use pgwire::api::auth::StartupHandler;
use pgwire::api::copy::CopyHandler;
use pgwire::api::portal::{Format, Portal};
use pgwire::api::query::{ExtendedQueryHandler, SimpleQueryHandler};
use pgwire::api::results::{
    DataRowEncoder, DescribePortalResponse, DescribeStatementResponse, FieldInfo, QueryResponse,
    Response, Tag,
};
use pgwire::api::stmt::{QueryParser, StoredStatement};
use pgwire::api::store::PortalStore;
use pgwire::api::{ClientInfo, ClientPortalStore, NoopHandler, PgWireServerHandlers, Type};
use pgwire::error::{ErrorInfo, PgWireError, PgWireResult};
use pgwire::messages::PgWireBackendMessage;
use tokio::net::TcpStream;

use crate::model::*;
use crate::observability;
use crate::schedule::{BookingError, BookingService};
use crate::sql::{self, Command};

pub struct SlotbookHandler {
    service: BookingService,
    query_parser: Arc<SlotbookQueryParser>,
}

impl SlotbookHandler {
    pub fn new(service: BookingService) -> Self {
        Self {
            service,
            query_parser: Arc::new(SlotbookQueryParser),
        }
    }

    async fn run(&self, query: &str, format: &Format) -> PgWireResult<Response> {
        let cmd = sql::parse_sql(query).map_err(sql_err)?;
        let label = observability::command_label(&cmd);
        let started = Instant::now();

        let result = self.execute_command(cmd, format).await;

        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(observability::QUERIES_TOTAL, "command" => label, "status" => status)
            .increment(1);
        metrics::histogram!(observability::QUERY_DURATION_SECONDS, "command" => label)
            .record(started.elapsed().as_secs_f64());
        if let Err(e) = &result {
            tracing::debug!("{label} failed: {e}");
        }
        result
    }

    async fn execute_command(&self, cmd: Command, format: &Format) -> PgWireResult<Response> {
        match cmd {
            Command::InsertRoom { number, company } => {
                let room = self
                    .service
                    .create_room(RoomRequest { number, company })
                    .await
                    .map_err(booking_err)?;
                room_rows(vec![room], format)
            }
            Command::SelectRooms { id: Some(id), name, company } => {
                let room = self.service.get_room(id).await.map_err(booking_err)?;
                let filter = room_filter(name, company)?;
                room_rows(filter.matches(&room).then_some(room).into_iter().collect(), format)
            }
            Command::SelectRooms { id: None, name, company } => {
                let filter = room_filter(name, company)?;
                let rooms = self.service.get_rooms(&filter).await.map_err(booking_err)?;
                room_rows(rooms, format)
            }
            Command::DeleteRoom { id } => {
                let removed = self.service.delete_room(id).await.map_err(booking_err)?;
                Ok(deleted(removed))
            }
            Command::InsertMeeting(req) => {
                let meeting = self.service.create(req).await.map_err(booking_err)?;
                meeting_rows(vec![meeting], format)
            }
            Command::SelectMeetings { id: Some(id), room_id } => {
                let meeting = self.service.get(id).await.map_err(booking_err)?;
                let keep = room_id.is_none_or(|r| r == meeting.room_id);
                meeting_rows(keep.then_some(meeting).into_iter().collect(), format)
            }
            Command::SelectMeetings { id: None, room_id } => {
                let meetings = self.service.get_all(room_id).await.map_err(booking_err)?;
                meeting_rows(meetings, format)
            }
            Command::DeleteMeeting { id } => {
                let removed = self.service.delete(id).await.map_err(booking_err)?;
                Ok(deleted(removed))
            }
            Command::SelectAvailability { date } => {
                let day = date.unwrap_or_else(now_ms);
                let grid = self
                    .service
                    .get_available(day)
                    .await
                    .map_err(booking_err)?;
                availability_rows(grid, format)
            }
        }
    }
}

fn room_filter(name: Option<String>, company: Option<String>) -> PgWireResult<RoomFilter> {
    let company = match company {
        Some(c) => Some(Company::from_name(&c).ok_or_else(|| {
            booking_err(BookingError::Validation(format!("unknown company: {c}")))
        })?),
        None => None,
    };
    Ok(RoomFilter { name, company })
}

fn deleted(removed: bool) -> Response {
    Response::Execution(Tag::new("DELETE").with_rows(usize::from(removed)))
}

/// RFC 3339 UTC text, second precision.
fn format_instant(ms: Ms) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_else(|| ms.to_string())
}

// ── Result sets ──────────────────────────────────────────────────

/// Column formats follow what the client asked for; simple queries are always text.
fn schema(columns: &[(&str, Type)], format: &Format) -> Vec<FieldInfo> {
    columns
        .iter()
        .enumerate()
        .map(|(i, (name, ty))| {
            FieldInfo::new(name.to_string(), None, None, ty.clone(), format.format_for(i))
        })
        .collect()
}

fn room_schema(format: &Format) -> Vec<FieldInfo> {
    schema(
        &[
            ("id", Type::INT8),
            ("name", Type::VARCHAR),
            ("number", Type::INT4),
            ("company", Type::VARCHAR),
        ],
        format,
    )
}

fn meeting_schema(format: &Format) -> Vec<FieldInfo> {
    schema(
        &[
            ("id", Type::INT8),
            ("room_id", Type::INT8),
            ("title", Type::VARCHAR),
            ("attendees", Type::VARCHAR),
            ("created", Type::VARCHAR),
            ("start", Type::VARCHAR),
            ("end", Type::VARCHAR),
        ],
        format,
    )
}

fn availability_schema(format: &Format) -> Vec<FieldInfo> {
    schema(
        &[
            ("room_id", Type::INT8),
            ("slot_start", Type::VARCHAR),
            ("meeting_id", Type::INT8),
            ("title", Type::VARCHAR),
        ],
        format,
    )
}

fn room_rows(rooms: Vec<Room>, format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(room_schema(format));
    let rows: Vec<PgWireResult<_>> = rooms
        .into_iter()
        .map(|room| {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&room.id)?;
            encoder.encode_field(&room.name)?;
            encoder.encode_field(&room.number)?;
            encoder.encode_field(&room.company.display_name().to_string())?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

fn meeting_rows(meetings: Vec<Meeting>, format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(meeting_schema(format));
    let rows: Vec<PgWireResult<_>> = meetings
        .into_iter()
        .map(|m| {
            let attendees = serde_json::to_string(&m.attendees)
                .map_err(|e| PgWireError::ApiError(Box::new(e)))?;
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&m.id)?;
            encoder.encode_field(&m.room_id)?;
            encoder.encode_field(&m.title)?;
            encoder.encode_field(&attendees)?;
            encoder.encode_field(&format_instant(m.created))?;
            encoder.encode_field(&format_instant(m.start))?;
            encoder.encode_field(&format_instant(m.end))?;
            Ok(encoder.take_row())
        })
        .collect();
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

/// One row per grid cell, rooms and slots in ascending order.
fn availability_rows(grid: AvailabilityGrid, format: &Format) -> PgWireResult<Response> {
    let schema = Arc::new(availability_schema(format));
    let mut rows: Vec<PgWireResult<_>> = Vec::new();
    for (room_id, row) in grid {
        for (slot_start, cell) in row {
            let mut encoder = DataRowEncoder::new(schema.clone());
            encoder.encode_field(&room_id)?;
            encoder.encode_field(&format_instant(slot_start))?;
            encoder.encode_field(&cell.as_ref().map(|m| m.id))?;
            encoder.encode_field(&cell.map(|m| m.title))?;
            rows.push(Ok(encoder.take_row()));
        }
    }
    Ok(Response::Query(QueryResponse::new(schema, stream::iter(rows))))
}

/// Result columns of a statement, guessed from its text so that
/// placeholders need not be bound yet.
fn result_schema(sql: &str, format: &Format) -> Vec<FieldInfo> {
    let lower = sql.to_lowercase();
    let returns_rows = lower.trim_start().starts_with("select")
        || lower.trim_start().starts_with("insert");
    if !returns_rows {
        return vec![];
    }
    if lower.contains("availability") {
        availability_schema(format)
    } else if lower.contains("meetings") {
        meeting_schema(format)
    } else if lower.contains("rooms") {
        room_schema(format)
    } else {
        vec![]
    }
}

#[async_trait]
impl SimpleQueryHandler for SlotbookHandler {
    async fn do_query<C>(&self, _client: &mut C, query: &str) -> PgWireResult<Vec<Response>>
    where
        C: ClientInfo + ClientPortalStore + Sink<PgWireBackendMessage> + Unpin + Send + Sync,
        C::Error: Debug,
        PgWireError: From<C::Error>,
    {
        Ok(vec![self.run(query, &Format::UnifiedText).await?])
    }
}

// ── Extended Query Protocol ──────────────────────────────────────

#[derive(Debug)]
pub struct SlotbookQueryParser;

#[async_trait]
impl QueryParser for SlotbookQueryParser {
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
        column_format: Option<&Format>,
    ) -> PgWireResult<Vec<FieldInfo>> {
        Ok(result_schema(
            stmt,
            column_format.unwrap_or(&Format::UnifiedText),
        ))
    }
}

#[async_trait]
impl ExtendedQueryHandler for SlotbookHandler {
    type Statement = String;
    type QueryParser = SlotbookQueryParser;

    fn query_parser(&self) -> Arc<Self::QueryParser> {
        self.query_parser.clone()
    }

    async fn do_query<C>(
        &self,
        _client: &mut C,
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
        self.run(&sql, &portal.result_column_format).await
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
        Ok(DescribeStatementResponse::new(
            param_types,
            result_schema(&target.statement, &Format::UnifiedText),
        ))
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
        Ok(DescribePortalResponse::new(result_schema(
            &target.statement.statement,
            &target.result_column_format,
        )))
    }
}

/// Count the highest $N parameter placeholder outside quoted literals.
fn count_params(sql: &str) -> usize {
    let mut max = 0usize;
    let bytes = sql.as_bytes();
    let mut in_literal = false;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' => {
                in_literal = !in_literal;
                i += 1;
            }
            b'$' if !in_literal => {
                i += 1;
                let start = i;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i > start
                    && let Ok(n) = sql[start..i].parse::<usize>()
                {
                    max = max.max(n);
                }
            }
            _ => i += 1,
        }
    }
    max
}

/// Substitute $1, $2, ... placeholders with bound parameter values (text format).
/// One left-to-right pass: placeholders inside quoted literals and inside
/// already-substituted values are left alone.
fn substitute_params(portal: &Portal<String>) -> String {
    let values: Vec<String> = portal
        .parameters
        .iter()
        .map(|param| match param {
            Some(bytes) => {
                let text = String::from_utf8_lossy(bytes);
                format!("'{}'", text.replace('\'', "''"))
            }
            None => "NULL".to_string(),
        })
        .collect();
    bind_placeholders(&portal.statement.statement, &values)
}

fn bind_placeholders(sql: &str, values: &[String]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.char_indices().peekable();
    let mut in_literal = false;
    while let Some((i, c)) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }
        if c != '$' || in_literal {
            out.push(c);
            continue;
        }
        let digits_start = i + 1;
        let mut digits_end = digits_start;
        while let Some(&(j, d)) = chars.peek() {
            if !d.is_ascii_digit() {
                break;
            }
            digits_end = j + 1;
            chars.next();
        }
        let value = sql[digits_start..digits_end]
            .parse::<usize>()
            .ok()
            .and_then(|n| n.checked_sub(1))
            .and_then(|idx| values.get(idx));
        match value {
            Some(v) => out.push_str(v),
            None => out.push_str(&sql[i..digits_end]),
        }
    }
    out
}

// ── Factory ──────────────────────────────────────────────────────

pub struct SlotbookFactory {
    handler: Arc<SlotbookHandler>,
    noop: Arc<NoopHandler>,
}

impl SlotbookFactory {
    pub fn new(service: BookingService) -> Self {
        Self {
            handler: Arc::new(SlotbookHandler::new(service)),
            noop: Arc::new(NoopHandler),
        }
    }
}

impl PgWireServerHandlers for SlotbookFactory {
    fn simple_query_handler(&self) -> Arc<impl SimpleQueryHandler> {
        self.handler.clone()
    }

    fn extended_query_handler(&self) -> Arc<impl ExtendedQueryHandler> {
        self.handler.clone()
    }

    fn startup_handler(&self) -> Arc<impl StartupHandler> {
        self.noop.clone()
    }

    fn copy_handler(&self) -> Arc<impl CopyHandler> {
        self.noop.clone()
    }
}

/// Serve one client connection until it closes. No TLS, no authentication.
pub async fn process_connection(
    socket: TcpStream,
    factory: Arc<SlotbookFactory>,
) -> std::io::Result<()> {
    pgwire::tokio::process_socket(socket, None, factory).await
}

// ── Errors ───────────────────────────────────────────────────────

fn sqlstate(e: &BookingError) -> &'static str {
    match e {
        BookingError::Validation(_) => "22023",
        BookingError::MeetingConflict(_) => "23P01",
        BookingError::RoomExists { .. } => "23505",
        BookingError::RoomNotFound(_) | BookingError::MeetingNotFound(_) => "02000",
        BookingError::Storage(_) => "58000",
    }
}

fn booking_err(e: BookingError) -> PgWireError {
    if let BookingError::Storage(msg) = &e {
        tracing::error!("storage failure: {msg}");
    }
    PgWireError::UserError(Box::new(ErrorInfo::new(
        "ERROR".into(),
        sqlstate(&e).into(),
        e.to_string(),
    )))
}

fn sql_err(e: crate::sql::SqlError) -> PgWireError {
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
        assert_eq!(count_params("SELECT * FROM meetings"), 0);
        assert_eq!(count_params("SELECT * FROM meetings WHERE room_id = $1"), 1);
        assert_eq!(count_params("INSERT INTO rooms VALUES ($2, $1)"), 2);
        assert_eq!(count_params("x = $10 AND y = $3"), 10);
    }

    #[test]
    fn placeholders_in_literals_are_not_parameters() {
        assert_eq!(count_params("INSERT INTO meetings (title) VALUES ('cost $9')"), 0);
        assert_eq!(count_params("x = '$4' AND y = $2"), 2);
    }

    #[test]
    fn bound_values_are_never_rescanned() {
        let values = vec!["'3'".to_string(), "'Budget $1M review'".to_string()];
        assert_eq!(
            bind_placeholders("INSERT INTO meetings (room_id, title) VALUES ($1, $2)", &values),
            "INSERT INTO meetings (room_id, title) VALUES ('3', 'Budget $1M review')"
        );
        assert_eq!(
            bind_placeholders("SELECT '$1' WHERE a = $1 AND b = $7", &values),
            "SELECT '$1' WHERE a = '3' AND b = $7"
        );
        assert_eq!(bind_placeholders("a = $12", &values), "a = $12");
    }

    #[test]
    fn sqlstate_per_error_kind() {
        assert_eq!(sqlstate(&BookingError::Validation("x".into())), "22023");
        assert_eq!(sqlstate(&BookingError::MeetingConflict(1)), "23P01");
        assert_eq!(
            sqlstate(&BookingError::RoomExists { number: 1, company: Company::Coke }),
            "23505"
        );
        assert_eq!(sqlstate(&BookingError::RoomNotFound(1)), "02000");
        assert_eq!(sqlstate(&BookingError::MeetingNotFound(1)), "02000");
        assert_eq!(sqlstate(&BookingError::Storage("io".into())), "58000");
    }

    #[test]
    fn result_schema_by_table() {
        let names = |sql: &str| -> Vec<String> {
            result_schema(sql, &Format::UnifiedText)
                .iter()
                .map(|f| f.name().to_string())
                .collect()
        };
        assert_eq!(names("SELECT * FROM availability WHERE date = $1")[1], "slot_start");
        assert_eq!(names("insert into meetings (room_id) values ($1)").len(), 7);
        assert_eq!(names("SELECT * FROM rooms"), vec!["id", "name", "number", "company"]);
        assert!(names("DELETE FROM rooms WHERE id = $1").is_empty());
    }

    #[test]
    fn instants_render_as_utc_rfc3339() {
        assert_eq!(format_instant(1_709_283_600_000), "2024-03-01T09:00:00Z");
        assert_eq!(format_instant(0), "1970-01-01T00:00:00Z");
    }
}
