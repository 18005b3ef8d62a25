use crate::{error::DitResult, record::Record};

/// A cursor over the rows of the datatable.
///
/// Implemented by whatever reads the database pages. The dumper reads the
/// rows twice: once to find the PEK list, once to extract the hashes.
pub trait RecordSource {
    /// Returns the next row, or `None` once every row has been read.
    fn next_record(&mut self) -> DitResult<Option<Record>>;

    /// Moves the cursor back to the first row.
    fn rewind(&mut self) -> DitResult<()>;
}

impl<S: RecordSource + ?Sized> RecordSource for Box<S> {
    fn next_record(&mut self) -> DitResult<Option<Record>> {
        (**self).next_record()
    }

    fn rewind(&mut self) -> DitResult<()> {
        (**self).rewind()
    }
}

/// A source over records held in memory.
#[derive(Clone, Debug, Default)]
pub struct VecSource {
    records: Vec<Record>,
    position: usize,
}

impl VecSource {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            position: 0,
        }
    }
}

impl From<Vec<Record>> for VecSource {
    fn from(records: Vec<Record>) -> Self {
        Self::new(records)
    }
}

impl RecordSource for VecSource {
    fn next_record(&mut self) -> DitResult<Option<Record>> {
        let record = self.records.get(self.position).cloned();
        if record.is_some() {
            self.position += 1;
        }

        Ok(record)
    }

    fn rewind(&mut self) -> DitResult<()> {
        self.position = 0;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{RecordSource, VecSource};
    use crate::{column::ColumnType, record::Record};

    #[test]
    fn test_vec_source() {
        let records = vec![
            Record::new().with_column("ATTm3", ColumnType::Text, "a"),
            Record::new().with_column("ATTm3", ColumnType::Text, "b"),
        ];
        let mut source = VecSource::new(records.clone());

        assert_eq!(Some(records[0].clone()), source.next_record().unwrap());
        assert_eq!(Some(records[1].clone()), source.next_record().unwrap());
        assert_eq!(None, source.next_record().unwrap());
        assert_eq!(None, source.next_record().unwrap());

        source.rewind().unwrap();
        assert_eq!(Some(records[0].clone()), source.next_record().unwrap());
    }
}
