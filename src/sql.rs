use chrono::{DateTime, NaiveDate};
use sqlparser::ast::{
    self, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value,
    ValueWithSpan,
};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    InsertRoom {
        number: i32,
        company: String,
    },
    SelectRooms {
        id: Option<RoomId>,
        name: Option<String>,
        company: Option<String>,
    },
    DeleteRoom {
        id: RoomId,
    },
    InsertMeeting(MeetingRequest),
    SelectMeetings {
        id: Option<MeetingId>,
        room_id: Option<RoomId>,
    },
    DeleteMeeting {
        id: MeetingId,
    },
    /// `date` is midnight UTC of the requested day; `None` means today.
    SelectAvailability {
        date: Option<Ms>,
    },
}

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    if stmts.is_empty() {
        return Err(SqlError::Empty);
    }

    match &stmts[0] {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let rows = extract_all_insert_rows(insert)?;
    if rows.len() > 1 {
        return Err(SqlError::Unsupported("multi-row INSERT".into()));
    }
    let values = &rows[0];

    match table.as_str() {
        "rooms" => {
            let cols = insert_columns(insert, &["number", "company"], values.len())?;
            let mut number = None;
            let mut company = None;
            for (col, expr) in cols.iter().zip(values) {
                match col.as_str() {
                    "number" => number = Some(parse_i32(expr)?),
                    "company" => company = parse_string_or_null(expr)?,
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::InsertRoom {
                number: number.ok_or(SqlError::MissingColumn("number"))?,
                company: company.unwrap_or_default(),
            })
        }
        "meetings" => {
            let cols = insert_columns(
                insert,
                &["room_id", "title", "attendees", "start"],
                values.len(),
            )?;
            let mut req = MeetingRequest::default();
            let mut room_id = None;
            for (col, expr) in cols.iter().zip(values) {
                match col.as_str() {
                    "room_id" => room_id = Some(parse_i64(expr)?),
                    "title" => req.title = parse_string_or_null(expr)?.unwrap_or_default(),
                    "attendees" => req.attendees = parse_string_array(expr)?,
                    "start" => req.start = parse_instant_or_null(expr)?,
                    "end" => return Err(SqlError::Unsupported("end is derived from start".into())),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            req.room_id = room_id.ok_or(SqlError::MissingColumn("room_id"))?;
            Ok(Command::InsertMeeting(req))
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "rooms" => Ok(Command::DeleteRoom { id }),
        "meetings" => Ok(Command::DeleteMeeting { id }),
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_select(query: &ast::Query) -> Result<Command, SqlError> {
    let select = match query.body.as_ref() {
        SetExpr::Select(s) => s,
        _ => return Err(SqlError::Unsupported("non-SELECT query".into())),
    };

    if select.from.is_empty() {
        return Err(SqlError::Parse("SELECT without FROM".into()));
    }
    let table = table_factor_name(&select.from[0].relation)?;

    let mut filters = Vec::new();
    if let Some(selection) = &select.selection {
        extract_eq_filters(selection, &mut filters)?;
    }

    match table.as_str() {
        "rooms" => {
            let (mut id, mut name, mut company) = (None, None, None);
            for (col, expr) in filters {
                match col.as_str() {
                    "id" => id = Some(parse_i64(expr)?),
                    "name" => name = parse_string_or_null(expr)?,
                    "company" => company = parse_string_or_null(expr)?,
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::SelectRooms { id, name, company })
        }
        "meetings" => {
            let (mut id, mut room_id) = (None, None);
            for (col, expr) in filters {
                match col.as_str() {
                    "id" => id = Some(parse_i64(expr)?),
                    "room_id" => room_id = Some(parse_i64(expr)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::SelectMeetings { id, room_id })
        }
        "availability" => {
            let mut date = None;
            for (col, expr) in filters {
                match col.as_str() {
                    "date" => date = Some(parse_date(expr)?),
                    other => return Err(SqlError::UnknownColumn(other.to_string())),
                }
            }
            Ok(Command::SelectAvailability { date })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

/// Flatten `a = 1 AND b = 2 ...` into `(column, value)` pairs.
fn extract_eq_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => extract_eq_filters(inner, out),
        Expr::BinaryOp { left, op, right } => match op {
            ast::BinaryOperator::And => {
                extract_eq_filters(left, out)?;
                extract_eq_filters(right, out)
            }
            ast::BinaryOperator::Eq => {
                let col = expr_column_name(left)
                    .ok_or_else(|| SqlError::Unsupported(format!("filter on {left}")))?;
                out.push((col, right.as_ref()));
                Ok(())
            }
            other => Err(SqlError::Unsupported(format!("operator {other} in WHERE"))),
        },
        other => Err(SqlError::Unsupported(format!("WHERE {other}"))),
    }
}

// ── Helpers ───────────────────────────────────────────────────

fn object_name_last(name: &ast::ObjectName) -> Option<String> {
    name.0.last().and_then(|part| match part {
        ObjectNamePart::Identifier(ident) => Some(ident.value.to_lowercase()),
        _ => None,
    })
}

fn insert_table_name(insert: &ast::Insert) -> Result<String, SqlError> {
    match &insert.table {
        TableObject::TableName(name) => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("unsupported table object in INSERT".into())),
    }
}

/// Column names of an INSERT, or `defaults` when none were listed.
fn insert_columns(
    insert: &ast::Insert,
    defaults: &[&str],
    values: usize,
) -> Result<Vec<String>, SqlError> {
    let cols: Vec<String> = if insert.columns.is_empty() {
        defaults.iter().take(values).map(|c| c.to_string()).collect()
    } else {
        insert.columns.iter().map(|c| c.value.to_lowercase()).collect()
    };
    if cols.len() != values {
        return Err(SqlError::WrongArity(cols.len(), values));
    }
    Ok(cols)
}

fn delete_table_name(delete: &ast::Delete) -> Result<String, SqlError> {
    let tables_with_joins = match &delete.from {
        FromTable::WithFromKeyword(t) | FromTable::WithoutKeyword(t) => t,
    };
    if let Some(first) = tables_with_joins.first() {
        table_factor_name(&first.relation)
    } else {
        Err(SqlError::Parse("DELETE without table".into()))
    }
}

fn table_factor_name(tf: &TableFactor) -> Result<String, SqlError> {
    match tf {
        TableFactor::Table { name, .. } => {
            object_name_last(name).ok_or_else(|| SqlError::Parse("empty table name".into()))
        }
        _ => Err(SqlError::Parse("complex table expression".into())),
    }
}

fn extract_all_insert_rows(insert: &ast::Insert) -> Result<Vec<Vec<Expr>>, SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => {
            if values.rows.is_empty() {
                return Err(SqlError::Parse("empty VALUES".into()));
            }
            Ok(values.rows.clone())
        }
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<i64, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: ast::BinaryOperator::Eq,
            right,
        } => {
            if expr_column_name(left).as_deref() == Some("id") {
                parse_i64(right)
            } else {
                Err(SqlError::MissingFilter("id"))
            }
        }
        _ => Err(SqlError::MissingFilter("id")),
    }
}

fn expr_column_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(ident.value.to_lowercase()),
        Expr::CompoundIdentifier(parts) => parts.last().map(|i| i.value.to_lowercase()),
        _ => None,
    }
}

fn extract_value(expr: &Expr) -> Option<&Value> {
    match expr {
        Expr::Value(ValueWithSpan { value, .. }) => Some(value),
        _ => None,
    }
}

fn parse_i64(expr: &Expr) -> Result<i64, SqlError> {
    if let Some(value) = extract_value(expr) {
        match value {
            Value::Number(s, _) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            Value::SingleQuotedString(s) => s
                .parse()
                .map_err(|e| SqlError::Parse(format!("bad integer: {e}"))),
            _ => Err(SqlError::Parse(format!("expected number, got {value:?}"))),
        }
    } else if let Expr::UnaryOp {
        op: ast::UnaryOperator::Minus,
        expr,
    } = expr
    {
        Ok(-parse_i64(expr)?)
    } else {
        Err(SqlError::Parse(format!("expected value, got {expr}")))
    }
}

fn parse_i32(expr: &Expr) -> Result<i32, SqlError> {
    let v = parse_i64(expr)?;
    i32::try_from(v).map_err(|_| SqlError::Parse(format!("{v} out of i32 range")))
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => Ok(Some(s.clone())),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value:?}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

/// `ARRAY['a', 'b']`, or NULL for no attendees.
fn parse_string_array(expr: &Expr) -> Result<Vec<String>, SqlError> {
    match expr {
        Expr::Array(ast::Array { elem, .. }) => elem
            .iter()
            .map(|e| {
                parse_string_or_null(e)?
                    .ok_or_else(|| SqlError::Parse("NULL inside attendees array".into()))
            })
            .collect(),
        _ if matches!(extract_value(expr), Some(Value::Null)) => Ok(Vec::new()),
        _ => Err(SqlError::Parse(format!("expected ARRAY[...], got {expr}"))),
    }
}

/// RFC 3339 text or integer Unix milliseconds.
fn parse_instant_or_null(expr: &Expr) -> Result<Option<Ms>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        Some(Value::SingleQuotedString(s)) => match s.trim().parse::<i64>() {
            Ok(ms) => Ok(Some(ms)),
            Err(_) => DateTime::parse_from_rfc3339(s.trim())
                .map(|dt| Some(dt.timestamp_millis()))
                .map_err(|e| SqlError::Parse(format!("bad timestamp {s:?}: {e}"))),
        },
        _ => parse_i64(expr).map(Some),
    }
}

/// `'YYYY-MM-DD'`, RFC 3339 text or Unix milliseconds, truncated to midnight UTC.
fn parse_date(expr: &Expr) -> Result<Ms, SqlError> {
    if let Some(Value::SingleQuotedString(s)) = extract_value(expr)
        && let Ok(date) = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
    {
        return Ok(date.and_time(chrono::NaiveTime::MIN).and_utc().timestamp_millis());
    }
    let instant = parse_instant_or_null(expr)
        .map_err(|e| SqlError::Parse(format!("bad date: {e}")))?
        .ok_or(SqlError::MissingFilter("date"))?;
    Ok(day_start(instant))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(usize, usize),
    MissingColumn(&'static str),
    MissingFilter(&'static str),
}

impl std::fmt::Display for SqlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlError::Parse(s) => write!(f, "parse error: {s}"),
            SqlError::Empty => write!(f, "empty query"),
            SqlError::Unsupported(s) => write!(f, "unsupported: {s}"),
            SqlError::UnknownTable(t) => write!(f, "unknown table: {t}"),
            SqlError::UnknownColumn(c) => write!(f, "unknown column: {c}"),
            SqlError::WrongArity(cols, values) => {
                write!(f, "{cols} columns but {values} values")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
