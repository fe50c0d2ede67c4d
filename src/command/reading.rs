use std::collections::BTreeMap;

use serde::Serialize;
use time::OffsetDateTime;

use super::InstrumentStatus;

/// Reflectance values keyed by wavelength in nanometres, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SpectralReading {
    values: BTreeMap<u16, f64>,
}

impl SpectralReading {
    /// Maps evenly spaced samples onto wavelengths starting at `start`.
    ///
    /// ```
    /// use spectro::SpectralReading;
    ///
    /// let reading = SpectralReading::from_uniform(400, 10, [0.5, 0.6, 0.7]);
    /// assert_eq!(Some(420), reading.end());
    /// assert_eq!(Some(10), reading.interval());
    /// assert_eq!(Some(0.6), reading.get(410));
    /// ```
    #[must_use]
    pub fn from_uniform(start: u16, interval: u16, samples: impl IntoIterator<Item = f64>) -> Self {
        let values = samples
            .into_iter()
            .scan(Some(start), |wavelength, value| {
                let current = (*wavelength)?;
                *wavelength = current.checked_add(interval);
                Some((current, value))
            })
            .collect();
        Self { values }
    }

    #[must_use]
    pub fn get(&self, wavelength: u16) -> Option<f64> {
        self.values.get(&wavelength).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u16, f64)> + '_ {
        self.values.iter().map(|(wavelength, value)| (*wavelength, *value))
    }

    #[must_use]
    pub fn start(&self) -> Option<u16> {
        self.values.keys().next().copied()
    }

    #[must_use]
    pub fn end(&self) -> Option<u16> {
        self.values.keys().next_back().copied()
    }

    /// Spacing between the first two wavelengths.
    #[must_use]
    pub fn interval(&self) -> Option<u16> {
        let mut keys = self.values.keys();
        let first = keys.next()?;
        let second = keys.next()?;
        Some(second - first)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(u16, f64)> for SpectralReading {
    fn from_iter<I: IntoIterator<Item = (u16, f64)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

/// A decoded measurement response.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measurement {
    status: InstrumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reading: Option<SpectralReading>,
    #[serde(with = "time::serde::rfc3339")]
    taken_at: OffsetDateTime,
}

impl Measurement {
    #[must_use]
    pub fn new(status: InstrumentStatus, reading: Option<SpectralReading>) -> Self {
        Self {
            status,
            reading,
            taken_at: OffsetDateTime::now_utc(),
        }
    }

    #[must_use]
    pub fn status(&self) -> &InstrumentStatus {
        &self.status
    }

    #[must_use]
    pub fn reading(&self) -> Option<&SpectralReading> {
        self.reading.as_ref()
    }

    #[must_use]
    pub fn taken_at(&self) -> OffsetDateTime {
        self.taken_at
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn uniform_samples_are_keyed_by_wavelength() {
        let reading = SpectralReading::from_uniform(360, 20, [0.1, 0.2, 0.3, 0.4]);

        assert_eq!(
            vec![(360, 0.1), (380, 0.2), (400, 0.3), (420, 0.4)],
            reading.iter().collect::<Vec<_>>()
        );
        assert_eq!(Some(360), reading.start());
        assert_eq!(Some(20), reading.interval());
    }

    #[test]
    fn single_sample_has_no_interval() {
        let reading = SpectralReading::from_uniform(500, 10, [1.0]);
        assert_eq!(None, reading.interval());
        assert_eq!(Some(500), reading.end());
    }

    #[test]
    fn reading_serialises_as_wavelength_map() {
        let reading = SpectralReading::from_uniform(400, 10, [0.25, 0.5]);
        let json = serde_json::to_string(&reading).expect("reading should serialise");
        assert_eq!(r#"{"400":0.25,"410":0.5}"#, json);
    }
}
