use chrono::NaiveDate;
use sqlparser::ast::{self, BinaryOperator, Expr, FromTable, ObjectNamePart, SetExpr, Statement, TableFactor, TableObject, Value, ValueWithSpan};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use ulid::Ulid;

use crate::model::*;

/// Parsed command from SQL input.
#[derive(Debug, PartialEq)]
pub enum Command {
    /// `INSERT INTO requests (...)`
    SubmitRequest(NewRequest),
    /// `INSERT INTO bookings (request_id)`: move a pending request into bookings.
    ApproveRequest {
        id: Ulid,
    },
    /// `DELETE FROM requests WHERE id = ...`
    RejectRequest {
        id: Ulid,
    },
    SelectAvailability {
        hall: String,
        date: NaiveDate,
    },
    SelectHalls {
        date: NaiveDate,
    },
    SelectRequests {
        email: Option<String>,
    },
    /// Approved bookings. `on` pins a single date; `from` (default today)
    /// is the earliest date listed.
    SelectBookings {
        on: Option<NaiveDate>,
        from: Option<NaiveDate>,
        hall: Option<String>,
        email: Option<String>,
    },
    /// One requester's records, pending and approved.
    SelectDashboard {
        email: Option<String>,
    },
}

/// Column order assumed by `INSERT INTO requests VALUES (...)` without a column list.
const REQUEST_COLUMNS: [&str; 9] = [
    "hall",
    "date",
    "slot",
    "event_name",
    "name",
    "email",
    "department",
    "designation",
    "phone",
];

pub fn parse_sql(sql: &str) -> Result<Command, SqlError> {
    let dialect = PostgreSqlDialect {};
    let stmts = Parser::parse_sql(&dialect, sql).map_err(|e| SqlError::Parse(e.to_string()))?;
    let Some(first) = stmts.first() else {
        return Err(SqlError::Empty);
    };

    match first {
        Statement::Insert(insert) => parse_insert(insert),
        Statement::Delete(delete) => parse_delete(delete),
        Statement::Query(query) => parse_select(query),
        other => Err(SqlError::Unsupported(format!("{other}"))),
    }
}

fn parse_insert(insert: &ast::Insert) -> Result<Command, SqlError> {
    let table = insert_table_name(insert)?;
    let row = single_insert_row(insert)?;
    let columns: Vec<String> = insert.columns.iter().map(|c| c.value.to_lowercase()).collect();

    match table.as_str() {
        "requests" => parse_request_row(&columns, row).map(Command::SubmitRequest),
        "bookings" => {
            let expr = match columns.iter().position(|c| c == "request_id") {
                Some(i) => row.get(i),
                None if columns.is_empty() => row.first(),
                None => return Err(SqlError::MissingColumn("request_id")),
            };
            let expr = expr.ok_or(SqlError::WrongArity("bookings", 1, row.len()))?;
            Ok(Command::ApproveRequest {
                id: parse_ulid_expr(expr)?,
            })
        }
        _ => Err(SqlError::UnknownTable(table)),
    }
}

fn parse_request_row(columns: &[String], row: &[Expr]) -> Result<NewRequest, SqlError> {
    let names: Vec<&str> = if columns.is_empty() {
        REQUEST_COLUMNS.iter().take(row.len()).copied().collect()
    } else {
        columns.iter().map(String::as_str).collect()
    };
    if names.len() != row.len() {
        return Err(SqlError::WrongArity("requests", names.len(), row.len()));
    }

    let mut fields: [Option<String>; 9] = Default::default();
    for (name, expr) in names.iter().zip(row) {
        let idx = REQUEST_COLUMNS
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| SqlError::UnknownColumn((*name).to_string()))?;
        fields[idx] = parse_string_or_null(expr)?;
    }
    let [hall, date, slot, event_name, name, email, department, designation, phone] = fields;

    let hall = hall.ok_or(SqlError::MissingColumn("hall"))?;
    let date = date.ok_or(SqlError::MissingColumn("date"))?;
    let slot = slot.ok_or(SqlError::MissingColumn("slot"))?;
    Ok(NewRequest {
        hall,
        date: parse_date_str(&date)?,
        slot: parse_slot_str(&slot)?,
        event_name: event_name.unwrap_or_default(),
        requester: Requester {
            name: name.unwrap_or_default(),
            email: email.unwrap_or_default(),
            department: department.unwrap_or_default(),
            designation: designation.unwrap_or_default(),
            phone: phone.unwrap_or_default(),
        },
    })
}

fn parse_delete(delete: &ast::Delete) -> Result<Command, SqlError> {
    let table = delete_table_name(delete)?;
    let id = extract_where_id(&delete.selection)?;

    match table.as_str() {
        "requests" => Ok(Command::RejectRequest { id }),
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

    let mut filters = Filters::default();
    if let Some(selection) = &select.selection {
        collect_filters(selection, &mut filters.0)?;
    }

    let command = match table.as_str() {
        "availability" => Command::SelectAvailability {
            hall: filters.string("hall")?.ok_or(SqlError::MissingFilter("hall"))?,
            date: filters.date("date", BinaryOperator::Eq)?.ok_or(SqlError::MissingFilter("date"))?,
        },
        "halls" => Command::SelectHalls {
            date: filters.date("date", BinaryOperator::Eq)?.ok_or(SqlError::MissingFilter("date"))?,
        },
        "requests" => Command::SelectRequests {
            email: filters.string("email")?,
        },
        "bookings" => Command::SelectBookings {
            on: filters.date("date", BinaryOperator::Eq)?,
            from: filters.date("date", BinaryOperator::GtEq)?,
            hall: filters.string("hall")?,
            email: filters.string("email")?,
        },
        "dashboard" => Command::SelectDashboard {
            email: filters.string("email")?,
        },
        _ => return Err(SqlError::UnknownTable(table)),
    };
    filters.finish()?;
    Ok(command)
}

/// WHERE conditions not yet consumed by a table's parser.
#[derive(Default)]
struct Filters<'a>(Vec<(String, BinaryOperator, &'a Expr)>);

impl<'a> Filters<'a> {
    fn take(&mut self, col: &str, op: BinaryOperator) -> Option<&'a Expr> {
        let idx = self.0.iter().position(|(c, o, _)| c == col && *o == op)?;
        Some(self.0.remove(idx).2)
    }

    fn string(&mut self, col: &str) -> Result<Option<String>, SqlError> {
        self.take(col, BinaryOperator::Eq).map(parse_string_expr).transpose()
    }

    fn date(&mut self, col: &str, op: BinaryOperator) -> Result<Option<NaiveDate>, SqlError> {
        self.take(col, op)
            .map(|e| parse_string_expr(e).and_then(|s| parse_date_str(&s)))
            .transpose()
    }

    /// Anything left over is a condition this table cannot honour.
    fn finish(self) -> Result<(), SqlError> {
        match self.0.first() {
            None => Ok(()),
            Some((col, op, value)) => Err(SqlError::Unsupported(format!("filter {col} {op} {value}"))),
        }
    }
}

/// Flatten `a = x AND b >= y AND ...` into (column, operator, value) triples.
fn collect_filters<'a>(expr: &'a Expr, out: &mut Vec<(String, BinaryOperator, &'a Expr)>) -> Result<(), SqlError> {
    match expr {
        Expr::Nested(inner) => collect_filters(inner, out),
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_filters(left, out)?;
            collect_filters(right, out)
        }
        Expr::BinaryOp { left, op, right } => {
            let col = expr_column_name(left).ok_or_else(|| SqlError::Parse(format!("expected column, got {left}")))?;
            out.push((col, op.clone(), right.as_ref()));
            Ok(())
        }
        other => Err(SqlError::Unsupported(format!("filter {other}"))),
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

fn single_insert_row(insert: &ast::Insert) -> Result<&[Expr], SqlError> {
    let body = insert
        .source
        .as_ref()
        .ok_or(SqlError::Parse("no VALUES".into()))?;
    match body.body.as_ref() {
        SetExpr::Values(values) => match values.rows.as_slice() {
            [] => Err(SqlError::Parse("empty VALUES".into())),
            [row] => Ok(row.as_slice()),
            _ => Err(SqlError::Unsupported("multi-row INSERT".into())),
        },
        _ => Err(SqlError::Parse("expected VALUES".into())),
    }
}

fn extract_where_id(selection: &Option<Expr>) -> Result<Ulid, SqlError> {
    let sel = selection.as_ref().ok_or(SqlError::MissingFilter("id"))?;
    match sel {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } if expr_column_name(left).as_deref() == Some("id") => parse_ulid_expr(right),
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

fn parse_string_expr(expr: &Expr) -> Result<String, SqlError> {
    match extract_value(expr) {
        Some(Value::SingleQuotedString(s)) => Ok(s.clone()),
        Some(value) => Err(SqlError::Parse(format!("expected string, got {value}"))),
        None => Err(SqlError::Parse(format!("expected value, got {expr}"))),
    }
}

fn parse_string_or_null(expr: &Expr) -> Result<Option<String>, SqlError> {
    match extract_value(expr) {
        Some(Value::Null) => Ok(None),
        _ => parse_string_expr(expr).map(Some),
    }
}

fn parse_ulid_expr(expr: &Expr) -> Result<Ulid, SqlError> {
    let s = parse_string_expr(expr)?;
    Ulid::from_string(&s).map_err(|e| SqlError::Parse(format!("bad ULID: {e}")))
}

fn parse_date_str(s: &str) -> Result<NaiveDate, SqlError> {
    parse_date(s).ok_or_else(|| SqlError::Parse(format!("bad date {s:?}, expected yyyy-MM-dd")))
}

fn parse_slot_str(s: &str) -> Result<Slot, SqlError> {
    s.parse().map_err(|e: MalformedRecord| SqlError::Parse(e.to_string()))
}

// ── Errors ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum SqlError {
    Parse(String),
    Empty,
    Unsupported(String),
    UnknownTable(String),
    UnknownColumn(String),
    WrongArity(&'static str, usize, usize),
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
            SqlError::WrongArity(t, expected, got) => {
                write!(f, "{t}: expected {expected} values, got {got}")
            }
            SqlError::MissingColumn(col) => write!(f, "missing column: {col}"),
            SqlError::MissingFilter(col) => write!(f, "missing filter: {col}"),
        }
    }
}

impl std::error::Error for SqlError {}
