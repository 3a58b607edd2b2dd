//! Time format classification of time series.

/// Reporting period granularity of a time series.
///
/// # Examples
///
/// ```
/// use sdmx_types::TimeFormat;
///
/// assert_eq!(TimeFormat::classify("2005"), Some(TimeFormat::Annual));
/// assert_eq!(TimeFormat::classify("2005-Q3"), Some(TimeFormat::Quarterly));
/// assert_eq!(TimeFormat::from_frequency("M"), Some(TimeFormat::Monthly));
/// assert_eq!(TimeFormat::Monthly.code(), "P1M");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TimeFormat {
    /// Yearly periods.
    Annual,
    /// Half-year periods.
    Semester,
    /// Four-month periods.
    Trimester,
    /// Quarterly periods.
    Quarterly,
    /// Monthly periods.
    Monthly,
    /// Weekly periods.
    Weekly,
    /// Daily periods.
    Daily,
    /// Hourly periods.
    Hourly,
    /// Date with time of day.
    DateTime,
}

impl TimeFormat {
    /// Maps a frequency code (`A`, `S`, `T`, `Q`, `M`, `W`, `D`, `B`, `H`, `N`).
    pub fn from_frequency(code: &str) -> Option<Self> {
        match code.trim() {
            "A" => Some(Self::Annual),
            "S" => Some(Self::Semester),
            "T" => Some(Self::Trimester),
            "Q" => Some(Self::Quarterly),
            "M" => Some(Self::Monthly),
            "W" => Some(Self::Weekly),
            "D" | "B" => Some(Self::Daily),
            "H" => Some(Self::Hourly),
            "N" => Some(Self::DateTime),
            _ => None,
        }
    }

    /// Classifies a reporting period by its shape.
    ///
    /// Accepts `YYYY`, `YYYY-Sn`, `YYYY-Tn`, `YYYY-Qn`, `YYYY-MM`,
    /// `YYYY-Www`, `YYYY-MM-DD` and `YYYY-MM-DDThh...`; the dash before the
    /// period letter may be omitted.
    pub fn classify(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() < 4 || !value.is_char_boundary(4) {
            return None;
        }
        let (year, rest) = value.split_at(4);
        if !all_digits(year) {
            return None;
        }
        if rest.is_empty() {
            return Some(Self::Annual);
        }
        let rest = rest.strip_prefix('-').unwrap_or(rest);

        if let Some((date, time)) = rest.split_once('T') {
            if is_month_day(date) {
                return (!time.is_empty()).then_some(Self::DateTime);
            }
        }
        if is_month_day(rest) {
            return Some(Self::Daily);
        }
        if rest.len() == 2 && all_digits(rest) {
            return in_range(rest, 1, 12).then_some(Self::Monthly);
        }

        let mut chars = rest.chars();
        let letter = chars.next()?;
        let period = chars.as_str();
        if period.is_empty() || !all_digits(period) {
            return None;
        }
        match letter {
            'A' => in_range(period, 1, 1).then_some(Self::Annual),
            'S' => in_range(period, 1, 2).then_some(Self::Semester),
            'T' => in_range(period, 1, 3).then_some(Self::Trimester),
            'Q' => in_range(period, 1, 4).then_some(Self::Quarterly),
            'M' => in_range(period, 1, 12).then_some(Self::Monthly),
            'W' => in_range(period, 1, 53).then_some(Self::Weekly),
            _ => None,
        }
    }

    /// Returns the ISO 8601 duration code used for the TIME_FORMAT attribute.
    pub fn code(self) -> &'static str {
        match self {
            Self::Annual => "P1Y",
            Self::Semester => "P6M",
            Self::Trimester => "P4M",
            Self::Quarterly => "P3M",
            Self::Monthly => "P1M",
            Self::Weekly => "P7D",
            Self::Daily => "P1D",
            Self::Hourly => "PT1H",
            Self::DateTime => "PT1M",
        }
    }
}

fn all_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit())
}

fn in_range(value: &str, min: u32, max: u32) -> bool {
    value
        .parse::<u32>()
        .map(|n| n >= min && n <= max)
        .unwrap_or(false)
}

fn is_month_day(value: &str) -> bool {
    match value.split_once('-') {
        Some((month, day)) => {
            month.len() == 2 && day.len() == 2 && in_range(month, 1, 12) && in_range(day, 1, 31)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_periods() {
        assert_eq!(TimeFormat::classify("2005-S2"), Some(TimeFormat::Semester));
        assert_eq!(TimeFormat::classify("2005T1"), Some(TimeFormat::Trimester));
        assert_eq!(TimeFormat::classify("2005Q4"), Some(TimeFormat::Quarterly));
        assert_eq!(TimeFormat::classify("2005-07"), Some(TimeFormat::Monthly));
        assert_eq!(TimeFormat::classify("2005M07"), Some(TimeFormat::Monthly));
        assert_eq!(TimeFormat::classify("2005-W52"), Some(TimeFormat::Weekly));
        assert_eq!(TimeFormat::classify("2005-12-31"), Some(TimeFormat::Daily));
        assert_eq!(
            TimeFormat::classify("2005-12-31T10:30:00"),
            Some(TimeFormat::DateTime)
        );
    }

    #[test]
    fn test_classify_rejects() {
        assert_eq!(TimeFormat::classify(""), None);
        assert_eq!(TimeFormat::classify("05"), None);
        assert_eq!(TimeFormat::classify("2005-Q5"), None);
        assert_eq!(TimeFormat::classify("2005-13"), None);
        assert_eq!(TimeFormat::classify("year"), None);
    }

    #[test]
    fn test_frequency_codes() {
        assert_eq!(TimeFormat::from_frequency("A"), Some(TimeFormat::Annual));
        assert_eq!(TimeFormat::from_frequency("B"), Some(TimeFormat::Daily));
        assert_eq!(TimeFormat::from_frequency("X"), None);
    }
}
