// Timestamp strings reach us from two writers: our own files use variable length
// unicode, while the acquisition scripts store fixed length byte strings. HDF5 can't
// convert between the two, so try each representation in turn.
use hdf5::types::{FixedAscii, FixedUnicode, VarLenAscii, VarLenUnicode};
use std::str::FromStr;

/// Longest fixed length string we expect (timestamps are 32 characters)
const MAX_FIXED_LEN: usize = 64;

/// Read a 1-D dataset of strings, whatever the string flavour
pub fn read_string_dataset(dataset: &hdf5::Dataset) -> Result<Vec<String>, hdf5::Error> {
    if let Ok(values) = dataset.read_raw::<VarLenUnicode>() {
        return Ok(values.iter().map(|s| s.as_str().to_string()).collect());
    }
    if let Ok(values) = dataset.read_raw::<VarLenAscii>() {
        return Ok(values.iter().map(|s| s.as_str().to_string()).collect());
    }
    if let Ok(values) = dataset.read_raw::<FixedUnicode<MAX_FIXED_LEN>>() {
        return Ok(values.iter().map(|s| s.as_str().to_string()).collect());
    }
    let values = dataset.read_raw::<FixedAscii<MAX_FIXED_LEN>>()?;
    Ok(values.iter().map(|s| s.as_str().to_string()).collect())
}

/// Read a scalar string attribute, whatever the string flavour
pub fn read_string_attr(attr: &hdf5::Attribute) -> Result<String, hdf5::Error> {
    if let Ok(value) = attr.read_scalar::<VarLenUnicode>() {
        return Ok(value.as_str().to_string());
    }
    if let Ok(value) = attr.read_scalar::<VarLenAscii>() {
        return Ok(value.as_str().to_string());
    }
    if let Ok(value) = attr.read_scalar::<FixedUnicode<MAX_FIXED_LEN>>() {
        return Ok(value.as_str().to_string());
    }
    let value = attr.read_scalar::<FixedAscii<MAX_FIXED_LEN>>()?;
    Ok(value.as_str().to_string())
}

/// Convert to the HDF5 unicode type; None if the string has an interior nul
pub fn to_unicode(value: &str) -> Option<VarLenUnicode> {
    VarLenUnicode::from_str(value).ok()
}
