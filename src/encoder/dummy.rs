use super::{EncoderColumn, RowEncoder, DUMMY_FORMAT};
use crate::page::Block;
use crate::{Error, Result};

/// Encoder for a record half that carries no columns; the half is sent absent.
#[derive(Debug, Default)]
pub struct DummyRowEncoder;

impl DummyRowEncoder {
    pub fn new(columns: Vec<EncoderColumn>) -> Result<Self> {
        if let Some(column) = columns.first() {
            return Err(Error::Config(format!(
                "{} encoder cannot encode column '{}'",
                DUMMY_FORMAT, column.name
            )));
        }
        Ok(Self)
    }
}

impl RowEncoder for DummyRowEncoder {
    fn append_column_value(&mut self, _block: &Block, _position: usize) -> Result<()> {
        Err(Error::encoding("dummy encoder does not accept columns"))
    }

    fn to_bytes(&mut self) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    fn clear(&mut self) {}

    fn writes_payload(&self) -> bool {
        false
    }
}
