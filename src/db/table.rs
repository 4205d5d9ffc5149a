use std::fmt;
use std::rc::Rc;

use once_cell::unsync::OnceCell;
use serde_json::Value;

use super::error::DbError;
use super::service::{check_column, DatabaseService, Row};

/// Immutable query builder over one table.
///
/// Every clause method returns a new builder and leaves `self` untouched.
/// Reads run a single `SELECT` on first use and cache the rows on that
/// builder; writes run immediately and never touch a cache.
#[derive(Clone)]
pub struct Table {
    db: DatabaseService,
    name: String,
    conditions: Vec<String>,
    params: Vec<Value>,
    order: Option<String>,
    offset: Option<usize>,
    rows: OnceCell<Rc<Vec<Row>>>,
}

impl Table {
    pub(crate) fn new(db: DatabaseService, name: &str) -> Self {
        Self {
            db,
            name: name.to_string(),
            conditions: Vec::new(),
            params: Vec::new(),
            order: None,
            offset: None,
            rows: OnceCell::new(),
        }
    }

    /// Copy of the clauses with an empty cache.
    fn derive(&self) -> Self {
        Self {
            db: self.db.clone(),
            name: self.name.clone(),
            conditions: self.conditions.clone(),
            params: self.params.clone(),
            order: self.order.clone(),
            offset: self.offset,
            rows: OnceCell::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn offset(&self) -> Option<usize> {
        self.offset
    }

    /// Whether rows are already cached on this builder.
    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.rows.get().is_some()
    }

    /// AND a raw SQL condition with `?` placeholders.
    #[must_use]
    pub fn where_clause<I>(&self, condition: &str, params: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        let mut next = self.derive();
        next.conditions.push(condition.to_string());
        next.params.extend(params.into_iter().map(Into::into));
        next
    }

    /// AND one equality per pair; `null` compares with `IS NULL`.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidIdentifier`] for a bad column name.
    pub fn filter<I, K, V>(&self, pairs: I) -> Result<Self, DbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        let mut next = self.derive();
        for (column, value) in pairs {
            let column = column.as_ref();
            check_column(column)?;
            match value.into() {
                Value::Null => next.conditions.push(format!("{column} IS NULL")),
                value => {
                    next.conditions.push(format!("{column} = ?"));
                    next.params.push(value);
                }
            }
        }
        Ok(next)
    }

    /// Replace the ordering, e.g. `"name DESC, id"`.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidIdentifier`] for anything but columns with an
    /// optional `ASC`/`DESC`.
    pub fn order_by(&self, clause: &str) -> Result<Self, DbError> {
        for term in clause.split(',') {
            let mut words = term.split_whitespace();
            let column = words.next().unwrap_or("");
            check_column(column)?;
            let direction_ok = match words.next() {
                None => true,
                Some(dir) => dir.eq_ignore_ascii_case("asc") || dir.eq_ignore_ascii_case("desc"),
            };
            if !direction_ok || words.next().is_some() {
                return Err(DbError::InvalidIdentifier(term.trim().to_string()));
            }
        }
        let mut next = self.derive();
        next.order = Some(clause.trim().to_string());
        Ok(next)
    }

    /// Select the single row at `offset` within the current ordering.
    ///
    /// # Errors
    ///
    /// [`DbError::Logic`] when a different offset is already set.
    pub fn at(&self, offset: usize) -> Result<Self, DbError> {
        if let Some(current) = self.offset.filter(|&o| o != offset) {
            return Err(DbError::Logic(format!(
                "offset {offset} requested on a builder already at offset {current}"
            )));
        }
        let mut next = self.derive();
        next.offset = Some(offset);
        Ok(next)
    }

    /// Handle on one column of the current row.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidIdentifier`].
    pub fn field(&self, column: &str) -> Result<Field, DbError> {
        check_column(column)?;
        Ok(Field {
            table: self.derive(),
            column: column.to_string(),
        })
    }

    fn where_sql(&self) -> String {
        if self.conditions.is_empty() {
            return String::new();
        }
        let joined = self
            .conditions
            .iter()
            .map(|c| format!("({c})"))
            .collect::<Vec<_>>()
            .join(" AND ");
        format!(" WHERE {joined}")
    }

    /// The statement a read would run.
    #[must_use]
    pub fn select_sql(&self) -> (String, Vec<Value>) {
        let mut sql = format!("SELECT * FROM {}{}", self.name, self.where_sql());
        if let Some(order) = &self.order {
            sql.push_str(" ORDER BY ");
            sql.push_str(order);
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" LIMIT 1 OFFSET {offset}"));
        }
        (sql, self.params.clone())
    }

    /// All matching rows, queried once per builder.
    ///
    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn rows(&self) -> Result<Rc<Vec<Row>>, DbError> {
        self.rows
            .get_or_try_init(|| {
                let (sql, params) = self.select_sql();
                self.db.query(&sql, &params).map(Rc::new)
            })
            .map(Rc::clone)
    }

    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn count(&self) -> Result<usize, DbError> {
        Ok(self.rows()?.len())
    }

    /// The row at the offset, or the first row.
    ///
    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn current(&self) -> Result<Option<Row>, DbError> {
        Ok(self.rows()?.first().cloned())
    }

    /// One column of [`Table::current`]; `None` when there is no row or no
    /// such column.
    ///
    /// # Errors
    ///
    /// [`DbError::InvalidIdentifier`] or [`DbError::Backend`].
    pub fn get(&self, column: &str) -> Result<Option<Value>, DbError> {
        check_column(column)?;
        Ok(self.rows()?.first().and_then(|row| row.get(column).cloned()))
    }

    /// Iterate over the cached rows.
    ///
    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn iter(&self) -> Result<Rows, DbError> {
        Ok(Rows {
            rows: self.rows()?,
            next: 0,
        })
    }

    fn reject_offset(&self, operation: &str) -> Result<(), DbError> {
        match self.offset {
            Some(offset) => Err(DbError::Logic(format!(
                "{operation} cannot be scoped by row offset {offset}"
            ))),
            None => Ok(()),
        }
    }

    /// `INSERT` one row. Existing caches are left alone.
    ///
    /// # Errors
    ///
    /// [`DbError::Logic`] on a builder with an offset, bad column names or
    /// backend failures.
    pub fn insert<I, K, V>(&self, row: I) -> Result<u64, DbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.reject_offset("INSERT")?;
        let mut columns = Vec::new();
        let mut params = Vec::new();
        for (column, value) in row {
            check_column(column.as_ref())?;
            columns.push(column.as_ref().to_string());
            params.push(value.into());
        }
        let sql = if columns.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", self.name)
        } else {
            let placeholders = vec!["?"; columns.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({placeholders})",
                self.name,
                columns.join(", ")
            )
        };
        self.db.execute(&sql, &params)
    }

    /// `DELETE` every row matching the conditions.
    ///
    /// # Errors
    ///
    /// [`DbError::Logic`] on a builder with an offset, or backend failures.
    pub fn delete(&self) -> Result<u64, DbError> {
        self.reject_offset("DELETE")?;
        let sql = format!("DELETE FROM {}{}", self.name, self.where_sql());
        self.db.execute(&sql, &self.params)
    }

    /// `UPDATE` every row matching the conditions.
    ///
    /// # Errors
    ///
    /// [`DbError::Logic`] on a builder with an offset or with nothing to
    /// set, bad column names or backend failures.
    pub fn update<I, K, V>(&self, values: I) -> Result<u64, DbError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.reject_offset("UPDATE")?;
        let mut assignments = Vec::new();
        let mut params = Vec::new();
        for (column, value) in values {
            check_column(column.as_ref())?;
            assignments.push(format!("{} = ?", column.as_ref()));
            params.push(value.into());
        }
        if assignments.is_empty() {
            return Err(DbError::Logic("UPDATE without any column".to_string()));
        }
        params.extend(self.params.iter().cloned());
        let sql = format!(
            "UPDATE {} SET {}{}",
            self.name,
            assignments.join(", "),
            self.where_sql()
        );
        self.db.execute(&sql, &params)
    }

    /// `UPDATE` a single column.
    ///
    /// # Errors
    ///
    /// Same as [`Table::update`].
    pub fn set(&self, column: &str, value: impl Into<Value>) -> Result<u64, DbError> {
        self.update([(column, value.into())])
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (sql, params) = self.select_sql();
        f.debug_struct("Table")
            .field("sql", &sql)
            .field("params", &params)
            .field("materialized", &self.is_materialized())
            .finish()
    }
}

/// One column of a builder's current row.
#[derive(Debug, Clone)]
pub struct Field {
    table: Table,
    column: String,
}

impl Field {
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// # Errors
    ///
    /// [`DbError::Backend`].
    pub fn value(&self) -> Result<Option<Value>, DbError> {
        self.table.get(&self.column)
    }

    /// `UPDATE` this column on every row matching the builder.
    ///
    /// # Errors
    ///
    /// Same as [`Table::update`].
    pub fn set(&self, value: impl Into<Value>) -> Result<u64, DbError> {
        self.table.set(&self.column, value)
    }
}

/// Iterator over a builder's cached rows.
pub struct Rows {
    rows: Rc<Vec<Row>>,
    next: usize,
}

impl Iterator for Rows {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let row = self.rows.get(self.next).cloned();
        if row.is_some() {
            self.next += 1;
        }
        row
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = self.rows.len().saturating_sub(self.next);
        (left, Some(left))
    }
}
