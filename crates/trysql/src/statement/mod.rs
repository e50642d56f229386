//! Textual model of one SQL command under construction.
//!
//! Fragments are appended per clause and rendered in a fixed clause order for the
//! statement's command kind. Clause lists that do not apply to the current kind are kept
//! but ignored when rendering.
//!
//! Predicate lists (WHERE / HAVING) support grouping through spliced boundary markers:
//! [`Statement::or`] and [`Statement::and`] insert a literal `) OR (` / `) AND (`
//! into the list that was touched last, replacing the default ` AND ` joiner at that
//! point.

/// Literal boundary spliced by [`Statement::and`].
pub const AND_BOUNDARY: &str = ") \nAND (";
/// Literal boundary spliced by [`Statement::or`].
pub const OR_BOUNDARY: &str = ") \nOR (";

fn is_boundary(part: &str) -> bool {
    part == AND_BOUNDARY || part == OR_BOUNDARY
}

/// The command a statement renders as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
}

/// How the row window is rendered after the main clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitingRows {
    #[default]
    None,
    /// ` LIMIT n OFFSET m`
    OffsetLimit,
    /// ` OFFSET m ROWS FETCH FIRST n ROWS ONLY`
    Standard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PredicateList {
    Where,
    Having,
}

/// One SQL statement as an ordered set of clause fragments.
#[derive(Debug, Clone)]
pub struct Statement {
    kind: Option<StatementKind>,
    distinct: bool,
    selects: Vec<String>,
    tables: Vec<String>,
    join: Vec<String>,
    inner_join: Vec<String>,
    outer_join: Vec<String>,
    left_outer_join: Vec<String>,
    right_outer_join: Vec<String>,
    wheres: Vec<String>,
    having: Vec<String>,
    group_by: Vec<String>,
    order_by: Vec<String>,
    last_list: Option<PredicateList>,
    sets: Vec<String>,
    columns: Vec<String>,
    /// Insert rows; always holds at least one (possibly empty) row.
    values: Vec<Vec<String>>,
    limiting: LimitingRows,
    offset: Option<String>,
    limit: Option<String>,
}

impl Default for Statement {
    fn default() -> Self {
        Self::new()
    }
}

impl Statement {
    pub fn new() -> Self {
        Self {
            kind: None,
            distinct: false,
            selects: Vec::new(),
            tables: Vec::new(),
            join: Vec::new(),
            inner_join: Vec::new(),
            outer_join: Vec::new(),
            left_outer_join: Vec::new(),
            right_outer_join: Vec::new(),
            wheres: Vec::new(),
            having: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            last_list: None,
            sets: Vec::new(),
            columns: Vec::new(),
            values: vec![Vec::new()],
            limiting: LimitingRows::None,
            offset: None,
            limit: None,
        }
    }

    pub fn kind(&self) -> Option<StatementKind> {
        self.kind
    }

    /// The first command call fixes the kind; later ones only contribute their table.
    fn set_kind(&mut self, kind: StatementKind) {
        if self.kind.is_none() {
            self.kind = Some(kind);
        }
    }

    pub fn limiting(&self) -> LimitingRows {
        self.limiting
    }

    /// WHERE fragments, including any spliced boundaries.
    pub fn where_fragments(&self) -> &[String] {
        &self.wheres
    }

    // ==================== Select ====================

    pub fn select<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_kind(StatementKind::Select);
        self.selects.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn select_distinct<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distinct = true;
        self.select(columns)
    }

    pub fn from<I, S>(&mut self, tables: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tables.extend(tables.into_iter().map(Into::into));
        self
    }

    // ==================== Joins ====================

    pub fn join(&mut self, join: impl Into<String>) -> &mut Self {
        self.join.push(join.into());
        self
    }

    pub fn inner_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.inner_join.push(join.into());
        self
    }

    pub fn outer_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.outer_join.push(join.into());
        self
    }

    pub fn left_outer_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.left_outer_join.push(join.into());
        self
    }

    pub fn right_outer_join(&mut self, join: impl Into<String>) -> &mut Self {
        self.right_outer_join.push(join.into());
        self
    }

    // ==================== Predicates ====================

    pub fn where_(&mut self, condition: impl Into<String>) -> &mut Self {
        self.wheres.push(condition.into());
        self.last_list = Some(PredicateList::Where);
        self
    }

    pub fn having(&mut self, condition: impl Into<String>) -> &mut Self {
        self.having.push(condition.into());
        self.last_list = Some(PredicateList::Having);
        self
    }

    /// Splice an OR boundary into the predicate list touched last.
    ///
    /// Without a prior WHERE or HAVING call there is nothing to group and the call is
    /// ignored.
    pub fn or(&mut self) -> &mut Self {
        self.splice(OR_BOUNDARY)
    }

    /// Splice an AND boundary into the predicate list touched last.
    pub fn and(&mut self) -> &mut Self {
        self.splice(AND_BOUNDARY)
    }

    fn splice(&mut self, boundary: &str) -> &mut Self {
        match self.last_list {
            Some(PredicateList::Where) => self.wheres.push(boundary.to_string()),
            Some(PredicateList::Having) => self.having.push(boundary.to_string()),
            None => {}
        }
        self
    }

    pub fn group_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn order_by<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.order_by.extend(columns.into_iter().map(Into::into));
        self
    }

    // ==================== Insert ====================

    pub fn insert_into(&mut self, table: impl Into<String>) -> &mut Self {
        self.set_kind(StatementKind::Insert);
        self.tables.push(table.into());
        self
    }

    /// Add one column and its value expression to the current row.
    pub fn values(&mut self, column: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.columns.push(column.into());
        self.current_row().push(value.into());
        self
    }

    pub fn into_columns<I, S>(&mut self, columns: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Append value expressions to the current row.
    pub fn into_values<I, S>(&mut self, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.current_row().extend(values.into_iter().map(Into::into));
        self
    }

    /// Start a new VALUES row.
    pub fn add_row(&mut self) -> &mut Self {
        self.values.push(Vec::new());
        self
    }

    fn current_row(&mut self) -> &mut Vec<String> {
        if self.values.is_empty() {
            self.values.push(Vec::new());
        }
        let last = self.values.len() - 1;
        &mut self.values[last]
    }

    // ==================== Update / Delete ====================

    pub fn update(&mut self, table: impl Into<String>) -> &mut Self {
        self.set_kind(StatementKind::Update);
        self.tables.push(table.into());
        self
    }

    pub fn set(&mut self, assignment: impl Into<String>) -> &mut Self {
        self.sets.push(assignment.into());
        self
    }

    pub fn delete_from(&mut self, table: impl Into<String>) -> &mut Self {
        self.set_kind(StatementKind::Delete);
        self.tables.push(table.into());
        self
    }

    // ==================== Limiting rows ====================

    pub fn limit(&mut self, limit: impl Into<String>) -> &mut Self {
        self.limit = Some(limit.into());
        self.limiting = LimitingRows::OffsetLimit;
        self
    }

    pub fn offset(&mut self, offset: impl Into<String>) -> &mut Self {
        self.offset = Some(offset.into());
        self.limiting = LimitingRows::OffsetLimit;
        self
    }

    pub fn fetch_first(&mut self, limit: impl Into<String>) -> &mut Self {
        self.limit = Some(limit.into());
        self.limiting = LimitingRows::Standard;
        self
    }

    pub fn offset_rows(&mut self, offset: impl Into<String>) -> &mut Self {
        self.offset = Some(offset.into());
        self.limiting = LimitingRows::Standard;
        self
    }

    // ==================== Rendering ====================

    /// Render the statement text. A statement without a command kind renders empty.
    pub fn to_sql(&self) -> String {
        let mut sql = String::new();
        match self.kind {
            Some(StatementKind::Select) => self.select_sql(&mut sql),
            Some(StatementKind::Insert) => self.insert_sql(&mut sql),
            Some(StatementKind::Update) => self.update_sql(&mut sql),
            Some(StatementKind::Delete) => self.delete_sql(&mut sql),
            None => {}
        }
        sql
    }

    fn select_sql(&self, sql: &mut String) {
        let keyword = if self.distinct {
            "SELECT DISTINCT"
        } else {
            "SELECT"
        };
        clause(sql, keyword, &self.selects, "", "", ", ");
        clause(sql, "FROM", &self.tables, "", "", ", ");
        self.joins_sql(sql);
        clause(sql, "WHERE", &self.wheres, "(", ")", " AND ");
        clause(sql, "GROUP BY", &self.group_by, "", "", ", ");
        clause(sql, "HAVING", &self.having, "(", ")", " AND ");
        clause(sql, "ORDER BY", &self.order_by, "", "", ", ");
        self.limiting_sql(sql, self.offset.as_deref(), self.limit.as_deref());
    }

    fn delete_sql(&self, sql: &mut String) {
        clause(sql, "DELETE FROM", &self.tables, "", "", "");
        clause(sql, "WHERE", &self.wheres, "(", ")", " AND ");
        self.limiting_sql(sql, None, self.limit.as_deref());
    }

    fn insert_sql(&self, sql: &mut String) {
        clause(sql, "INSERT INTO", &self.tables, "", "", "");
        clause(sql, "", &self.columns, "(", ")", ", ");
        for (i, row) in self.values.iter().enumerate() {
            let keyword = if i == 0 { "VALUES" } else { "," };
            clause(sql, keyword, row, "(", ")", ", ");
        }
    }

    fn update_sql(&self, sql: &mut String) {
        clause(sql, "UPDATE", &self.tables, "", "", "");
        self.joins_sql(sql);
        clause(sql, "SET", &self.sets, "", "", ", ");
        clause(sql, "WHERE", &self.wheres, "(", ")", " AND ");
        self.limiting_sql(sql, None, self.limit.as_deref());
    }

    fn joins_sql(&self, sql: &mut String) {
        clause(sql, "JOIN", &self.join, "", "", "\nJOIN ");
        clause(sql, "INNER JOIN", &self.inner_join, "", "", "\nINNER JOIN ");
        clause(sql, "OUTER JOIN", &self.outer_join, "", "", "\nOUTER JOIN ");
        clause(
            sql,
            "LEFT OUTER JOIN",
            &self.left_outer_join,
            "",
            "",
            "\nLEFT OUTER JOIN ",
        );
        clause(
            sql,
            "RIGHT OUTER JOIN",
            &self.right_outer_join,
            "",
            "",
            "\nRIGHT OUTER JOIN ",
        );
    }

    fn limiting_sql(&self, sql: &mut String, offset: Option<&str>, limit: Option<&str>) {
        match self.limiting {
            LimitingRows::None => {}
            LimitingRows::OffsetLimit => {
                if let Some(limit) = limit {
                    sql.push_str(" LIMIT ");
                    sql.push_str(limit);
                }
                if let Some(offset) = offset {
                    sql.push_str(" OFFSET ");
                    sql.push_str(offset);
                }
            }
            LimitingRows::Standard => {
                if let Some(offset) = offset {
                    sql.push_str(" OFFSET ");
                    sql.push_str(offset);
                    sql.push_str(" ROWS");
                }
                if let Some(limit) = limit {
                    sql.push_str(" FETCH FIRST ");
                    sql.push_str(limit);
                    sql.push_str(" ROWS ONLY");
                }
            }
        }
    }
}

/// Write one clause: newline separator, keyword, bracketed parts joined by `conjunction`.
///
/// The conjunction is not written next to a spliced boundary marker.
fn clause(
    sql: &mut String,
    keyword: &str,
    parts: &[String],
    open: &str,
    close: &str,
    conjunction: &str,
) {
    if parts.is_empty() {
        return;
    }
    if !sql.is_empty() {
        sql.push('\n');
    }
    sql.push_str(keyword);
    sql.push(' ');
    sql.push_str(open);
    for (i, part) in parts.iter().enumerate() {
        if i > 0 && !is_boundary(part) && !is_boundary(&parts[i - 1]) {
            sql.push_str(conjunction);
        }
        sql.push_str(part);
    }
    sql.push_str(close);
}
