use ndarray::{ArrayD, Axis, Ix1, Ix2, Ix3};
use std::path::Path;
use time::UtcOffset;

use super::constants::{TIMESTAMP_STR_NAME, WEIGHT_NAME};
use super::error::WeightError;
use super::hdf_strings::read_string_dataset;
use super::timestamp::{parse_timestamp, to_seconds, Timestamp};

/// Which load cells to read from a weight file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSelection {
    /// Every shelf, each summed over its plates
    AllShelves,
    /// A single load cell by its sensor id
    Plate(i64),
}

impl WeightSelection {
    /// Negative ids select all shelves, matching the command line convention
    pub fn from_id(id: i64) -> Self {
        if id < 0 {
            Self::AllShelves
        } else {
            Self::Plate(id)
        }
    }
}

/// One plotted line: a title and a reading per timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct WeightTrace {
    pub title: String,
    pub values: Vec<f64>,
}

/// Weight readings of one or more sensors sharing a set of timestamps.
///
/// Traces are ordered top to bottom as they are plotted.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightSeries {
    pub timestamps: Vec<Timestamp>,
    pub traces: Vec<WeightTrace>,
}

impl WeightSeries {
    pub fn new(timestamps: Vec<Timestamp>, traces: Vec<WeightTrace>) -> Result<Self, WeightError> {
        if timestamps.is_empty() {
            return Err(WeightError::Empty);
        }
        for trace in traces.iter() {
            if trace.values.len() != timestamps.len() {
                return Err(WeightError::LengthMismatch {
                    weights: trace.values.len(),
                    timestamps: timestamps.len(),
                });
            }
        }
        Ok(Self { timestamps, traces })
    }

    /// Read the selected sensors from a weight file
    pub fn read(
        path: &Path,
        selection: WeightSelection,
        group_prefix: &str,
        timezone: UtcOffset,
    ) -> Result<Self, WeightError> {
        let file = hdf5::File::open(path)?;
        match selection {
            WeightSelection::AllShelves => {
                let timestamps = read_timestamps(&file.dataset(TIMESTAMP_STR_NAME)?, timezone)?;
                let data = file.dataset(WEIGHT_NAME)?.read_dyn::<f64>()?;
                Self::new(timestamps, shelf_traces(data)?)
            }
            WeightSelection::Plate(id) => {
                let group = file.group(&format!("{group_prefix}{id}"))?;
                let timestamps = read_timestamps(&group.dataset(TIMESTAMP_STR_NAME)?, timezone)?;
                let data = group.dataset(WEIGHT_NAME)?.read_dyn::<f64>()?;
                let shape = data.shape().to_vec();
                let values = data
                    .into_dimensionality::<Ix1>()
                    .map_err(|_| WeightError::BadShape(shape))?
                    .to_vec();
                Self::new(
                    timestamps,
                    vec![WeightTrace {
                        title: format!("Load cell #{id}"),
                        values,
                    }],
                )
            }
        }
    }

    pub fn start(&self) -> &Timestamp {
        &self.timestamps[0]
    }

    /// Seconds since the first weight sample, for every sample
    pub fn elapsed_seconds(&self) -> Vec<f64> {
        to_seconds(&self.timestamps, self.start())
    }
}

fn read_timestamps(dataset: &hdf5::Dataset, timezone: UtcOffset) -> Result<Vec<Timestamp>, WeightError> {
    let strings = read_string_dataset(dataset)?;
    Ok(strings
        .iter()
        .map(|s| parse_timestamp(s, timezone))
        .collect::<Result<Vec<_>, _>>()?)
}

/// Turn the `w` dataset of a whole-rig weight file into one trace per shelf.
///
/// The dataset is `[shelf, plate, sample]` (plates are summed) or already
/// `[shelf, sample]`. Shelf 1 is the bottom shelf, so it is plotted last.
fn shelf_traces(data: ArrayD<f64>) -> Result<Vec<WeightTrace>, WeightError> {
    let shape = data.shape().to_vec();
    let per_shelf = match data.ndim() {
        3 => data
            .into_dimensionality::<Ix3>()
            .map_err(|_| WeightError::BadShape(shape.clone()))?
            .sum_axis(Axis(1)),
        2 => data
            .into_dimensionality::<Ix2>()
            .map_err(|_| WeightError::BadShape(shape.clone()))?,
        _ => return Err(WeightError::BadShape(shape)),
    };
    let n_shelves = per_shelf.nrows();
    Ok((0..n_shelves)
        .rev()
        .map(|shelf| WeightTrace {
            title: format!("Shelf {}", shelf + 1),
            values: per_shelf.row(shelf).to_vec(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hdf_strings::to_unicode;
    use hdf5::types::VarLenUnicode;
    use ndarray::{Array1, Array3};
    use time::macros::{datetime, offset};

    fn timestamp_strings(n: usize) -> Array1<VarLenUnicode> {
        (0..n)
            .map(|i| to_unicode(&format!("2019-05-01 12:00:0{i}.000000")).unwrap())
            .collect()
    }

    #[test]
    fn test_read_all_shelves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.h5");
        let file = hdf5::File::create(&path).unwrap();
        file.new_dataset_builder()
            .with_data(&timestamp_strings(3))
            .create(TIMESTAMP_STR_NAME)
            .unwrap();
        // 2 shelves x 2 plates x 3 samples
        let w = Array3::from_shape_vec(
            (2, 2, 3),
            vec![1.0, 2.0, 3.0, 10.0, 20.0, 30.0, 5.0, 5.0, 5.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        file.new_dataset_builder()
            .with_data(&w)
            .create(WEIGHT_NAME)
            .unwrap();
        drop(file);

        let series =
            WeightSeries::read(&path, WeightSelection::AllShelves, "plate_", offset!(-8)).unwrap();
        assert_eq!(*series.start(), datetime!(2019-05-01 12:00:00 -8));
        assert_eq!(series.traces.len(), 2);
        assert_eq!(series.traces[0].title, "Shelf 2");
        assert_eq!(series.traces[0].values, vec![6.0, 6.0, 6.0]);
        assert_eq!(series.traces[1].title, "Shelf 1");
        assert_eq!(series.traces[1].values, vec![11.0, 22.0, 33.0]);
        assert_eq!(series.elapsed_seconds(), vec![0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_read_single_plate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weights.h5");
        let file = hdf5::File::create(&path).unwrap();
        let group = file.create_group("plate_42").unwrap();
        group
            .new_dataset_builder()
            .with_data(&timestamp_strings(2))
            .create(TIMESTAMP_STR_NAME)
            .unwrap();
        group
            .new_dataset_builder()
            .with_data(&Array1::from(vec![100.0, 90.5]))
            .create(WEIGHT_NAME)
            .unwrap();
        drop(group);
        drop(file);

        let series =
            WeightSeries::read(&path, WeightSelection::from_id(42), "plate_", offset!(-8)).unwrap();
        assert_eq!(series.traces.len(), 1);
        assert_eq!(series.traces[0].title, "Load cell #42");
        assert_eq!(series.traces[0].values, vec![100.0, 90.5]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let t0 = datetime!(2019-05-01 12:00:00 UTC);
        let result = WeightSeries::new(
            vec![t0],
            vec![WeightTrace {
                title: String::from("Shelf 1"),
                values: vec![1.0, 2.0],
            }],
        );
        assert!(matches!(
            result,
            Err(WeightError::LengthMismatch { weights: 2, timestamps: 1 })
        ));
        assert_eq!(WeightSelection::from_id(-1), WeightSelection::AllShelves);
    }
}
