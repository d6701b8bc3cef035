//! Dynamic SQL generation for entity tables.
//!
//! Predicates and search parameters are translated into SQL text with
//! positional placeholders (`?1`, `?2`, ...) and a parallel list of bound
//! parameters. Identifiers are always quoted; values are never inlined.

use chrono::SecondsFormat;
use rusqlite::ToSql;
use rusqlite::types::{ToSqlOutput, Value as SqlValue};

use crate::schema::{Entity, FieldSelector, FieldValue, Predicate};
use crate::types::SearchParameters;

/// A fragment of SQL with bound parameters.
#[derive(Debug, Clone, Default)]
pub struct SqlFragment {
    /// The SQL clause.
    pub sql: String,
    /// Bound parameter values.
    pub params: Vec<SqlParam>,
}

/// A bound SQL parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    /// String parameter.
    String(String),
    /// Integer parameter.
    Integer(i64),
    /// Float parameter.
    Float(f64),
    /// Null parameter.
    Null,
}

impl SqlParam {
    /// Creates a string parameter.
    pub fn string(s: impl Into<String>) -> Self {
        SqlParam::String(s.into())
    }

    /// Creates an integer parameter.
    pub fn integer(i: i64) -> Self {
        SqlParam::Integer(i)
    }
}

impl From<&FieldValue> for SqlParam {
    fn from(value: &FieldValue) -> Self {
        match value {
            FieldValue::Null => SqlParam::Null,
            FieldValue::Bool(b) => SqlParam::Integer(i64::from(*b)),
            FieldValue::Integer(i) => SqlParam::Integer(*i),
            FieldValue::Float(f) => SqlParam::Float(*f),
            FieldValue::Text(s) => SqlParam::String(s.clone()),
            // Fixed-width UTC text so that lexical order is time order.
            FieldValue::Timestamp(ts) => {
                SqlParam::String(ts.to_rfc3339_opts(SecondsFormat::Nanos, true))
            }
        }
    }
}

impl ToSql for SqlParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlParam::String(s) => ToSqlOutput::from(s.as_str()),
            SqlParam::Integer(i) => ToSqlOutput::from(*i),
            SqlParam::Float(f) => ToSqlOutput::from(*f),
            SqlParam::Null => ToSqlOutput::Owned(SqlValue::Null),
        })
    }
}

impl SqlFragment {
    /// Creates a new SQL fragment.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Adds a parameter placeholder and returns the placeholder string.
    pub fn add_param(&mut self, param: SqlParam) -> String {
        self.params.push(param);
        format!("?{}", self.params.len())
    }

    /// Appends SQL text.
    pub fn push_sql(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Appends another fragment, renumbering its placeholders.
    pub fn append(&mut self, other: SqlFragment) {
        let offset = self.params.len();
        self.sql.push_str(&renumber(&other.sql, offset));
        self.params.extend(other.params);
    }

    /// Combines with another fragment using OR.
    pub fn or(mut self, other: SqlFragment) -> Self {
        if self.sql.is_empty() {
            return other;
        }
        if !other.sql.is_empty() {
            let rhs = renumber(&other.sql, self.params.len());
            self.sql = format!("({}) OR ({})", self.sql, rhs);
            self.params.extend(other.params);
        }
        self
    }

    /// Returns true if this fragment is empty.
    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }
}

/// Shifts every `?N` placeholder in `sql` by `offset`.
fn renumber(sql: &str, offset: usize) -> String {
    if offset == 0 {
        return sql.to_string();
    }
    let mut out = String::with_capacity(sql.len() + 8);
    let mut chars = sql.chars().peekable();
    let mut in_literal = false;
    while let Some(c) = chars.next() {
        if c == '\'' {
            in_literal = !in_literal;
            out.push(c);
            continue;
        }
        if c == '?' && !in_literal {
            let mut digits = String::new();
            while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
                digits.push(d);
                chars.next();
            }
            match digits.parse::<usize>() {
                Ok(n) => out.push_str(&format!("?{}", n + offset)),
                Err(_) => out.push('?'),
            }
            continue;
        }
        out.push(c);
    }
    out
}

/// Quotes an identifier for SQLite.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Escapes `%`, `_` and the escape character itself for a `LIKE ... ESCAPE '\'`.
fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds statements against the table of one entity type.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    table: String,
    columns: Vec<&'static str>,
    id_column: &'static str,
}

impl QueryBuilder {
    /// Creates a builder for the table of `E`.
    pub fn for_entity<E: Entity>() -> Self {
        let schema = E::schema();
        Self {
            table: quote_ident(schema.name()),
            columns: schema.fields().iter().map(|f| f.name()).collect(),
            id_column: schema.id().name(),
        }
    }

    /// The quoted table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn column_list(&self) -> String {
        self.columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `WHERE` condition for a predicate.
    pub fn predicate<E: Entity>(&self, predicate: &Predicate<E>) -> SqlFragment {
        let mut fragment = SqlFragment::default();
        match predicate {
            Predicate::Equals { field, value } => {
                let column = quote_ident(field.name());
                if value.is_null() {
                    fragment.sql = format!("{} IS NULL", column);
                } else {
                    let p = fragment.add_param(SqlParam::from(value));
                    fragment.sql = format!("{} = {}", column, p);
                }
            }
            Predicate::OneOf { field, values } => {
                let column = quote_ident(field.name());
                let placeholders: Vec<String> = values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| fragment.add_param(SqlParam::from(v)))
                    .collect();
                let has_null = values.iter().any(FieldValue::is_null);
                fragment.sql = match (placeholders.is_empty(), has_null) {
                    (true, false) => "0".to_string(),
                    (true, true) => format!("{} IS NULL", column),
                    (false, false) => format!("{} IN ({})", column, placeholders.join(", ")),
                    (false, true) => format!(
                        "({} IN ({}) OR {} IS NULL)",
                        column,
                        placeholders.join(", "),
                        column
                    ),
                };
            }
        }
        fragment
    }

    /// `WHERE` condition for a search term over the searchable fields.
    ///
    /// Empty when the term is blank. A term over no searchable fields
    /// matches nothing.
    pub fn search_term<E: Entity>(&self, term: &str, fields: &[FieldSelector<E>]) -> SqlFragment {
        let term = term.trim();
        if term.is_empty() {
            return SqlFragment::default();
        }
        if fields.is_empty() {
            return SqlFragment::new("0");
        }
        let pattern = format!("%{}%", escape_like(term));
        fields.iter().fold(SqlFragment::default(), |acc, field| {
            let mut clause = SqlFragment::default();
            let p = clause.add_param(SqlParam::string(pattern.clone()));
            clause.sql = format!("{} LIKE {} ESCAPE '\\'", quote_ident(field.name()), p);
            acc.or(clause)
        })
    }

    /// `SELECT <columns> FROM <table> [WHERE ...] ORDER BY <id>`.
    pub fn select(&self, condition: SqlFragment, limit: Option<u64>) -> SqlFragment {
        let mut fragment = SqlFragment::new(format!("SELECT {} FROM {}", self.column_list(), self.table));
        if !condition.is_empty() {
            fragment.push_sql(" WHERE ");
            fragment.append(condition);
        }
        fragment.push_sql(&format!(" ORDER BY {} ASC", quote_ident(self.id_column)));
        if let Some(limit) = limit {
            let p = fragment.add_param(SqlParam::integer(clamp_i64(limit)));
            fragment.push_sql(&format!(" LIMIT {}", p));
        }
        fragment
    }

    /// One search page: filter, sort, then `LIMIT page_size OFFSET page_size * page`.
    pub fn search_page<E: Entity>(&self, condition: SqlFragment, params: &SearchParameters<E>) -> SqlFragment {
        let mut fragment = SqlFragment::new(format!("SELECT {} FROM {}", self.column_list(), self.table));
        if !condition.is_empty() {
            fragment.push_sql(" WHERE ");
            fragment.append(condition);
        }
        let direction = if params.is_descending() { "DESC" } else { "ASC" };
        fragment.push_sql(&format!(
            " ORDER BY {} {}, {} ASC",
            quote_ident(params.sort_field().name()),
            direction,
            quote_ident(self.id_column)
        ));
        let limit = fragment.add_param(SqlParam::integer(clamp_i64(params.limit())));
        let offset = fragment.add_param(SqlParam::integer(clamp_i64(params.offset())));
        fragment.push_sql(&format!(" LIMIT {} OFFSET {}", limit, offset));
        fragment
    }

    /// `SELECT COUNT(*) FROM <table> [WHERE ...]`.
    pub fn count(&self, condition: SqlFragment) -> SqlFragment {
        let mut fragment = SqlFragment::new(format!("SELECT COUNT(*) FROM {}", self.table));
        if !condition.is_empty() {
            fragment.push_sql(" WHERE ");
            fragment.append(condition);
        }
        fragment
    }

    /// `SELECT EXISTS(SELECT 1 FROM <table> WHERE ...)`.
    pub fn exists(&self, condition: SqlFragment) -> SqlFragment {
        let mut fragment = SqlFragment::new(format!("SELECT EXISTS(SELECT 1 FROM {} WHERE ", self.table));
        fragment.append(condition);
        fragment.push_sql(")");
        fragment
    }

    /// `INSERT INTO <table> (...) VALUES (...)`, leaving out the columns in `skip`.
    pub fn insert(&self, values: &[(&'static str, FieldValue)], skip: Option<&str>) -> SqlFragment {
        let mut fragment = SqlFragment::default();
        let mut columns = Vec::with_capacity(values.len());
        let mut placeholders = Vec::with_capacity(values.len());
        for (name, value) in values {
            if Some(*name) == skip {
                continue;
            }
            columns.push(quote_ident(name));
            placeholders.push(fragment.add_param(SqlParam::from(value)));
        }
        fragment.sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.table,
            columns.join(", "),
            placeholders.join(", ")
        );
        fragment
    }

    /// `UPDATE <table> SET ... WHERE <id> = ?`.
    pub fn update(&self, values: &[(&'static str, FieldValue)], id: &FieldValue) -> SqlFragment {
        let mut fragment = SqlFragment::default();
        let assignments: Vec<String> = values
            .iter()
            .filter(|(name, _)| *name != self.id_column)
            .map(|(name, value)| {
                let p = fragment.add_param(SqlParam::from(value));
                format!("{} = {}", quote_ident(name), p)
            })
            .collect();
        let p = fragment.add_param(SqlParam::from(id));
        fragment.sql = format!(
            "UPDATE {} SET {} WHERE {} = {}",
            self.table,
            assignments.join(", "),
            quote_ident(self.id_column),
            p
        );
        fragment
    }

    /// `DELETE FROM <table> WHERE ...`.
    pub fn delete(&self, condition: SqlFragment) -> SqlFragment {
        let mut fragment = SqlFragment::new(format!("DELETE FROM {} WHERE ", self.table));
        fragment.append(condition);
        fragment
    }
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::tests_support::Widget;

    #[test]
    fn test_add_param_numbers_placeholders() {
        let mut fragment = SqlFragment::new("");
        assert_eq!(fragment.add_param(SqlParam::integer(1)), "?1");
        assert_eq!(fragment.add_param(SqlParam::string("a")), "?2");
        assert_eq!(fragment.params.len(), 2);
    }

    #[test]
    fn test_renumber_skips_literals() {
        assert_eq!(renumber("a = ?1 AND b LIKE ?2 ESCAPE '?'", 3), "a = ?4 AND b LIKE ?5 ESCAPE '?'");
        assert_eq!(renumber("x = ?1", 0), "x = ?1");
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("email"), "\"email\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_equality_predicate() {
        let builder = QueryBuilder::for_entity::<Widget>();
        let predicate = Widget::field("label").unwrap().eq("bolt").unwrap();
        let fragment = builder.predicate(&predicate);
        assert_eq!(fragment.sql, "\"label\" = ?1");
        assert_eq!(fragment.params, vec![SqlParam::string("bolt")]);
    }

    #[test]
    fn test_null_equality_predicate() {
        let builder = QueryBuilder::for_entity::<Widget>();
        let predicate = Widget::field("note").unwrap().eq(FieldValue::Null).unwrap();
        assert_eq!(builder.predicate(&predicate).sql, "\"note\" IS NULL");
    }

    #[test]
    fn test_membership_predicate() {
        let builder = QueryBuilder::for_entity::<Widget>();
        let id = Widget::id_selector();

        let fragment = builder.predicate(&id.one_of([1, 2, 3]).unwrap());
        assert_eq!(fragment.sql, "\"id\" IN (?1, ?2, ?3)");

        let note = Widget::field("note").unwrap();
        let fragment = builder.predicate(&note.one_of(vec![FieldValue::from("a"), FieldValue::Null]).unwrap());
        assert_eq!(fragment.sql, "(\"note\" IN (?1) OR \"note\" IS NULL)");

        let fragment = builder.predicate(&id.one_of(Vec::<i64>::new()).unwrap());
        assert_eq!(fragment.sql, "0");
    }

    #[test]
    fn test_search_page_sql() {
        let builder = QueryBuilder::for_entity::<Widget>();
        let params = SearchParameters::new("bo", Widget::field("weight").unwrap(), true, 20, 2);
        let condition = builder.search_term(params.search_term(), &Widget::schema().searchable_fields());
        let fragment = builder.search_page(condition, &params);
        assert_eq!(
            fragment.sql,
            "SELECT \"id\", \"label\", \"weight\", \"note\" FROM \"Widget\" \
             WHERE \"label\" LIKE ?1 ESCAPE '\\' \
             ORDER BY \"weight\" DESC, \"id\" ASC LIMIT ?2 OFFSET ?3"
        );
        assert_eq!(
            fragment.params,
            vec![SqlParam::string("%bo%"), SqlParam::integer(20), SqlParam::integer(40)]
        );
    }

    #[test]
    fn test_search_term_without_fields_matches_nothing() {
        let builder = QueryBuilder::for_entity::<Widget>();
        assert!(builder.search_term::<Widget>("  ", &[]).is_empty());
        let fragment = builder.search_term::<Widget>("bolt", &[]);
        assert_eq!(fragment.sql, "0");
        assert!(fragment.params.is_empty());
    }

    #[test]
    fn test_insert_skips_generated_identity() {
        let builder = QueryBuilder::for_entity::<Widget>();
        let values = Widget::schema().values(&Widget::default()).unwrap();
        let fragment = builder.insert(&values, Some("id"));
        assert_eq!(
            fragment.sql,
            "INSERT INTO \"Widget\" (\"label\", \"weight\", \"note\") VALUES (?1, ?2, ?3)"
        );
    }

    #[test]
    fn test_update_sets_non_identity_columns() {
        let builder = QueryBuilder::for_entity::<Widget>();
        let values = Widget::schema().values(&Widget::default()).unwrap();
        let fragment = builder.update(&values, &FieldValue::Integer(4));
        assert_eq!(
            fragment.sql,
            "UPDATE \"Widget\" SET \"label\" = ?1, \"weight\" = ?2, \"note\" = ?3 WHERE \"id\" = ?4"
        );
        assert_eq!(fragment.params[3], SqlParam::integer(4));
    }

    #[test]
    fn test_timestamp_binding_is_fixed_width() {
        let ts = chrono::DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&chrono::Utc);
        assert_eq!(
            SqlParam::from(&FieldValue::Timestamp(ts)),
            SqlParam::string("2024-05-01T10:00:00.000000000Z")
        );
    }
}
