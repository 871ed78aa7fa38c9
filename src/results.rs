use std::ops::Index;
use std::sync::{Arc, Weak};

use crate::driver::Driver;
use crate::error::Error;

/// Column type reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Decimal,
    Tiny,
    Short,
    Long,
    LongLong,
    Float,
    Double,
    Null,
    Timestamp,
    Date,
    Time,
    DateTime,
    Year,
    Varchar,
    Bit,
    Json,
    Enum,
    Set,
    Blob,
    VarString,
    String,
    Geometry,
}

/// Metadata of one column, shared by every row of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldInfo {
    name: String,
    column_type: ColumnType,
    length: u64,
}

impl FieldInfo {
    #[must_use]
    pub fn new(name: impl Into<String>, column_type: ColumnType, length: u64) -> Self {
        Self {
            name: name.into(),
            column_type,
            length,
        }
    }

    /// Column name as reported by the server.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Declared column width.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.length
    }
}

/// One materialized row.
///
/// Cells hold the driver's raw bytes (`None` means SQL NULL); the field
/// metadata shared with the owning [`ResultSet`] gives names and types for
/// interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    cells: Vec<Option<Vec<u8>>>,
    fields: Arc<Vec<FieldInfo>>,
}

impl Row {
    fn new(cells: Vec<Option<Vec<u8>>>, fields: Arc<Vec<FieldInfo>>) -> Self {
        Self { cells, fields }
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// `true` when the cell exists and holds SQL NULL.
    #[must_use]
    pub fn is_null(&self, index: usize) -> bool {
        self.cells.get(index).is_some_and(Option::is_none)
    }

    /// Raw bytes of a cell; `None` for SQL NULL or an out-of-range index.
    #[must_use]
    pub fn bytes(&self, index: usize) -> Option<&[u8]> {
        self.cells.get(index)?.as_deref()
    }

    /// UTF-8 view of a cell; `None` when NULL, out of range, or not UTF-8.
    #[must_use]
    pub fn text(&self, index: usize) -> Option<&str> {
        std::str::from_utf8(self.bytes(index)?).ok()
    }

    /// Raw bytes of a cell looked up by column name.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&[u8]> {
        let index = self.fields.iter().position(|f| f.name() == column_name)?;
        self.bytes(index)
    }

    /// Column metadata, in server order.
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }
}

impl Index<usize> for Row {
    type Output = Option<Vec<u8>>;

    fn index(&self, index: usize) -> &Self::Output {
        &self.cells[index]
    }
}

/// Marker allocated beside a retained native result. Snapshots hold a weak
/// reference to it; when the connection releases the native result the marker
/// goes with it and the snapshots report themselves expired.
#[derive(Debug)]
pub(crate) struct ResultAnchor;

/// Immutable snapshot of one query result.
///
/// Rows and field metadata are copied out of the native resource at store
/// time. The native resource itself stays owned by the connection and is
/// released at the connection's next statement, or at close; from then on the
/// snapshot is expired and row access fails, while field metadata and the
/// affected-row count stay readable.
#[derive(Debug, Clone)]
pub struct ResultSet {
    rows: Vec<Row>,
    fields: Arc<Vec<FieldInfo>>,
    affected_rows: u64,
    backing: Option<Weak<ResultAnchor>>,
}

impl ResultSet {
    /// Snapshot for a statement that produced no result set.
    ///
    /// Never expires: there is no backing resource to lose.
    #[must_use]
    pub fn empty_set() -> Self {
        Self {
            rows: Vec::new(),
            fields: Arc::new(Vec::new()),
            affected_rows: 0,
            backing: None,
        }
    }

    /// `true` once the backing native result was released.
    #[must_use]
    pub fn expired(&self) -> bool {
        match &self.backing {
            None => false,
            Some(anchor) => anchor.strong_count() == 0,
        }
    }

    /// Row count; zero once expired.
    #[must_use]
    pub fn len(&self) -> usize {
        if self.expired() { 0 } else { self.rows.len() }
    }

    /// `true` for zero rows, a statement without a result set, or an expired
    /// snapshot.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The materialized rows.
    ///
    /// # Errors
    /// [`Error::ResultExpired`] once the backing native result was released.
    pub fn rows(&self) -> Result<&[Row], Error> {
        if self.expired() {
            Err(Error::ResultExpired)
        } else {
            Ok(&self.rows)
        }
    }

    /// Number of columns; zero for empty and result-less statements.
    #[must_use]
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Column metadata, in server order. Survives expiry.
    #[must_use]
    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    /// Rows changed or matched by the statement that produced this result.
    #[must_use]
    pub fn affected_rows(&self) -> u64 {
        self.affected_rows
    }
}

impl Index<usize> for ResultSet {
    type Output = Row;

    /// Panics when the snapshot is expired or the index is out of range; use
    /// [`ResultSet::rows`] for fallible access.
    fn index(&self, index: usize) -> &Row {
        match self.rows() {
            Ok(rows) => &rows[index],
            Err(_) => panic!("result set expired"),
        }
    }
}

/// Copy a stored native result into an owned snapshot.
///
/// Zero-row results stop early with no field metadata. A row fetch error
/// rolls the whole snapshot back and surfaces as [`Error::Result`]. The
/// affected-row count is read last so it reflects the statement that produced
/// this result.
pub(crate) fn materialize<D: Driver>(
    driver: &D,
    handle: &mut D::Handle,
    native: &mut D::Results,
    backing: Weak<ResultAnchor>,
) -> Result<ResultSet, Error> {
    let row_count = driver.num_rows(native);
    if row_count == 0 {
        return Ok(ResultSet {
            rows: Vec::new(),
            fields: Arc::new(Vec::new()),
            affected_rows: 0,
            backing: Some(backing),
        });
    }

    let field_count = driver.num_fields(native);
    let mut fields = Vec::with_capacity(field_count);
    while let Some(field) = driver.fetch_field(native) {
        fields.push(field);
    }
    let fields = Arc::new(fields);

    let mut rows = Vec::with_capacity(usize::try_from(row_count).unwrap_or_default());
    loop {
        match driver.fetch_row(handle, native) {
            Ok(Some(cells)) => rows.push(Row::new(cells, Arc::clone(&fields))),
            Ok(None) => break,
            Err(err) => return Err(Error::Result(err)),
        }
    }

    let affected_rows = driver.affected_rows(handle);
    Ok(ResultSet {
        rows,
        fields,
        affected_rows,
        backing: Some(backing),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(values: &[&str], anchor: &Arc<ResultAnchor>) -> ResultSet {
        let fields = Arc::new(vec![FieldInfo::new("name", ColumnType::VarString, 255)]);
        let rows = values
            .iter()
            .map(|v| Row::new(vec![Some(v.as_bytes().to_vec())], Arc::clone(&fields)))
            .collect();
        ResultSet {
            rows,
            fields,
            affected_rows: values.len() as u64,
            backing: Some(Arc::downgrade(anchor)),
        }
    }

    #[test]
    fn rows_readable_while_backing_lives() {
        let anchor = Arc::new(ResultAnchor);
        let rs = snapshot(&["alpha", "beta"], &anchor);
        assert!(!rs.expired());
        assert_eq!(rs.len(), 2);
        let rows = rs.rows().expect("live rows");
        assert_eq!(rows[0].text(0), Some("alpha"));
        assert_eq!(rows[1].get("name"), Some(b"beta".as_ref()));
    }

    #[test]
    fn dropping_the_anchor_expires_row_access_only() {
        let anchor = Arc::new(ResultAnchor);
        let rs = snapshot(&["alpha"], &anchor);
        drop(anchor);

        assert!(rs.expired());
        assert_eq!(rs.len(), 0);
        assert!(rs.is_empty());
        assert_eq!(rs.rows(), Err(Error::ResultExpired));
        // Metadata and counts survive.
        assert_eq!(rs.field_count(), 1);
        assert_eq!(rs.fields()[0].name(), "name");
        assert_eq!(rs.affected_rows(), 1);
    }

    #[test]
    #[should_panic(expected = "result set expired")]
    fn indexing_an_expired_snapshot_panics() {
        let anchor = Arc::new(ResultAnchor);
        let rs = snapshot(&["alpha"], &anchor);
        drop(anchor);
        let _ = &rs[0];
    }

    #[test]
    fn empty_set_never_expires() {
        let rs = ResultSet::empty_set();
        assert!(!rs.expired());
        assert!(rs.is_empty());
        assert_eq!(rs.field_count(), 0);
        assert_eq!(rs.rows().expect("still live").len(), 0);
    }

    #[test]
    fn row_null_and_missing_cells() {
        let fields = Arc::new(vec![
            FieldInfo::new("id", ColumnType::LongLong, 20),
            FieldInfo::new("note", ColumnType::VarString, 255),
        ]);
        let row = Row::new(vec![Some(b"7".to_vec()), None], fields);
        assert_eq!(row.len(), 2);
        assert!(!row.is_null(0));
        assert!(row.is_null(1));
        assert!(!row.is_null(2));
        assert_eq!(row.bytes(1), None);
        assert_eq!(row.text(0), Some("7"));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row[0], Some(b"7".to_vec()));
    }
}
