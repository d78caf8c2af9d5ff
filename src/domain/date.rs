//! Genealogical Date Grammar
//!
//! Parses and formats GEDCOM-style date expressions (`27 NOV 1852`,
//! `ABT 1850`, `BET 1840 AND 1845`, `BEF 1900`, ...).
//!
//! Parsing never fails: text outside the grammar becomes an
//! [`DateForm::Unknown`] value that keeps the literal for redisplay.

use std::cmp::Ordering;
use std::fmt;

use chrono::NaiveDate;
use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{digit1, space1},
    combinator::{all_consuming, map, map_res, value, verify},
    sequence::{pair, preceded, separated_pair, terminated, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};

const MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Coarse classification of a date value
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateKind {
    Exact,
    Approximate,
    Range,
    Before,
    After,
    Unknown,
}

/// The surface form a date was written in.
///
/// Several forms share a [`DateKind`]; the form is kept so that
/// formatting reproduces the same qualifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateForm {
    /// `27 NOV 1852`, `NOV 1852`, `1852`
    Plain,
    /// `ABT 1850`
    About,
    /// `CAL 1850`
    Calculated,
    /// `EST 1850`
    Estimated,
    /// `BET 1840 AND 1845`
    Between,
    /// `FROM 1840 TO 1845`
    FromTo,
    /// `FROM 1840`
    From,
    /// `TO 1845`
    To,
    /// `BEF 1900`
    Before,
    /// `AFT 1900`
    After,
    /// Anything else
    Unknown,
}

impl DateForm {
    pub fn kind(&self) -> DateKind {
        match self {
            DateForm::Plain => DateKind::Exact,
            DateForm::About | DateForm::Calculated | DateForm::Estimated => DateKind::Approximate,
            DateForm::Between | DateForm::FromTo => DateKind::Range,
            DateForm::Before | DateForm::To => DateKind::Before,
            DateForm::After | DateForm::From => DateKind::After,
            DateForm::Unknown => DateKind::Unknown,
        }
    }

    fn keyword(&self) -> Option<&'static str> {
        match self {
            DateForm::About => Some("ABT"),
            DateForm::Calculated => Some("CAL"),
            DateForm::Estimated => Some("EST"),
            DateForm::From => Some("FROM"),
            DateForm::To => Some("TO"),
            DateForm::Before => Some("BEF"),
            DateForm::After => Some("AFT"),
            DateForm::Plain | DateForm::Between | DateForm::FromTo | DateForm::Unknown => None,
        }
    }
}

/// A point on the Gregorian calendar with optional month/day precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarPoint {
    pub year: i32,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub month: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub day: Option<u32>,
}

impl CalendarPoint {
    pub fn year(year: i32) -> Self {
        Self { year, month: None, day: None }
    }

    pub fn month(year: i32, month: u32) -> Self {
        Self { year, month: Some(month), day: None }
    }

    pub fn full(year: i32, month: u32, day: u32) -> Self {
        Self { year, month: Some(month), day: Some(day) }
    }

    /// Full dates must exist on the calendar
    fn is_valid(&self) -> bool {
        match (self.month, self.day) {
            (Some(m), Some(d)) => NaiveDate::from_ymd_opt(self.year, m, d).is_some(),
            (Some(m), None) => (1..=12).contains(&m),
            (None, None) => true,
            (None, Some(_)) => false,
        }
    }

    /// First day the point can stand for, as (year, month, day)
    fn earliest(&self) -> (i32, u32, u32) {
        (self.year, self.month.unwrap_or(1), self.day.unwrap_or(1))
    }

    /// Last day the point can stand for; days past month end still compare correctly
    fn latest(&self) -> (i32, u32, u32) {
        (self.year, self.month.unwrap_or(12), self.day.unwrap_or(31))
    }

    /// Whether a range from `self` to `end` is non-empty
    fn may_precede(&self, end: &CalendarPoint) -> bool {
        self.earliest() <= end.latest()
    }

    /// Convert to a chrono date when day precision is known
    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month?, self.day?)
    }
}

impl fmt::Display for CalendarPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let month_name = self
            .month
            .and_then(|m| MONTHS.get((m as usize).wrapping_sub(1)));
        match (self.day, month_name) {
            (Some(day), Some(month)) => write!(f, "{} {} {}", day, month, self.year),
            (None, Some(month)) => write!(f, "{} {}", month, self.year),
            _ => write!(f, "{}", self.year),
        }
    }
}

/// A parsed genealogical date.
///
/// Equality is semantic: the original text only participates for
/// [`DateForm::Unknown`] values, where it is the only content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DateValue {
    form: DateForm,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    start: Option<CalendarPoint>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    end: Option<CalendarPoint>,
    original: String,
}

impl DateValue {
    /// Parse a date expression. Never fails.
    pub fn parse(text: &str) -> Self {
        let normalized = normalize(text);
        let parsed = all_consuming(date_expr)(&normalized);
        match parsed {
            Ok((_, (form, start, end))) => Self {
                form,
                start: Some(start),
                end,
                original: text.to_string(),
            },
            Err(_) => Self::unknown(text),
        }
    }

    /// Build an unknown value holding the literal text
    pub fn unknown(text: &str) -> Self {
        Self {
            form: DateForm::Unknown,
            start: None,
            end: None,
            original: text.to_string(),
        }
    }

    /// Exact value for a known calendar point
    pub fn exact(point: CalendarPoint) -> Self {
        let mut value = Self {
            form: DateForm::Plain,
            start: Some(point),
            end: None,
            original: String::new(),
        };
        value.original = value.format();
        value
    }

    /// Serialize back into GEDCOM date text
    pub fn format(&self) -> String {
        match (self.form, self.start, self.end) {
            (DateForm::Unknown, _, _) | (_, None, _) => {
                self.original.split_whitespace().collect::<Vec<_>>().join(" ")
            }
            (DateForm::Plain, Some(start), _) => start.to_string(),
            (DateForm::Between, Some(start), Some(end)) => format!("BET {} AND {}", start, end),
            (DateForm::FromTo, Some(start), Some(end)) => format!("FROM {} TO {}", start, end),
            (form, Some(start), _) => match form.keyword() {
                Some(keyword) => format!("{} {}", keyword, start),
                None => start.to_string(),
            },
        }
    }

    pub fn kind(&self) -> DateKind {
        self.form.kind()
    }

    pub fn form(&self) -> DateForm {
        self.form
    }

    /// Earliest bound of the value
    pub fn start(&self) -> Option<CalendarPoint> {
        self.start
    }

    /// Second bound of a range
    pub fn end(&self) -> Option<CalendarPoint> {
        self.end
    }

    /// Text as it was given to [`DateValue::parse`]
    pub fn original(&self) -> &str {
        &self.original
    }

    /// The calendar date of an exact, day-precision value
    pub fn exact_date(&self) -> Option<NaiveDate> {
        if self.kind() != DateKind::Exact {
            return None;
        }
        self.start?.to_naive_date()
    }

    fn unknown_text(&self) -> String {
        if self.form == DateForm::Unknown {
            normalize(&self.original)
        } else {
            String::new()
        }
    }

    fn kind_rank(&self) -> u8 {
        match self.kind() {
            DateKind::Exact => 0,
            DateKind::Approximate => 1,
            DateKind::Range => 2,
            DateKind::Before => 3,
            DateKind::After => 4,
            DateKind::Unknown => 5,
        }
    }
}

impl PartialEq for DateValue {
    fn eq(&self, other: &Self) -> bool {
        self.form == other.form
            && self.start == other.start
            && self.end == other.end
            && self.unknown_text() == other.unknown_text()
    }
}

impl Eq for DateValue {}

impl Ord for DateValue {
    fn cmp(&self, other: &Self) -> Ordering {
        // values without a calendar point sort last
        (self.start.is_none(), self.start, self.kind_rank(), self.form, self.end)
            .cmp(&(other.start.is_none(), other.start, other.kind_rank(), other.form, other.end))
            .then_with(|| self.unknown_text().cmp(&other.unknown_text()))
    }
}

impl PartialOrd for DateValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for DateValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format())
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

// =========================================================================
// Grammar
// =========================================================================

type Parsed = (DateForm, CalendarPoint, Option<CalendarPoint>);

fn date_expr(input: &str) -> IResult<&str, Parsed> {
    alt((
        map(
            preceded(
                pair(tag("BET"), space1),
                verify(
                    separated_pair(calendar_point, tuple((space1, tag("AND"), space1)), calendar_point),
                    |(start, end): &(CalendarPoint, CalendarPoint)| start.may_precede(end),
                ),
            ),
            |(start, end)| (DateForm::Between, start, Some(end)),
        ),
        map(
            preceded(
                pair(tag("FROM"), space1),
                verify(
                    separated_pair(calendar_point, tuple((space1, tag("TO"), space1)), calendar_point),
                    |(start, end): &(CalendarPoint, CalendarPoint)| start.may_precede(end),
                ),
            ),
            |(start, end)| (DateForm::FromTo, start, Some(end)),
        ),
        map(pair(terminated(qualifier, space1), calendar_point), |(form, point)| {
            (form, point, None)
        }),
        map(calendar_point, |point| (DateForm::Plain, point, None)),
    ))(input)
}

fn qualifier(input: &str) -> IResult<&str, DateForm> {
    alt((
        value(DateForm::About, tag("ABT")),
        value(DateForm::Calculated, tag("CAL")),
        value(DateForm::Estimated, tag("EST")),
        value(DateForm::Before, tag("BEF")),
        value(DateForm::After, tag("AFT")),
        value(DateForm::From, tag("FROM")),
        value(DateForm::To, tag("TO")),
    ))(input)
}

fn calendar_point(input: &str) -> IResult<&str, CalendarPoint> {
    verify(
        alt((
            map(tuple((day, space1, month, space1, year)), |(d, _, m, _, y)| {
                CalendarPoint::full(y, m, d)
            }),
            map(separated_pair(month, space1, year), |(m, y)| CalendarPoint::month(y, m)),
            map(year, CalendarPoint::year),
        )),
        CalendarPoint::is_valid,
    )(input)
}

fn day(input: &str) -> IResult<&str, u32> {
    map_res(verify(digit1, |s: &str| s.len() <= 2), |s: &str| s.parse::<u32>())(input)
}

fn month(input: &str) -> IResult<&str, u32> {
    alt((
        value(1, tag("JAN")),
        value(2, tag("FEB")),
        value(3, tag("MAR")),
        value(4, tag("APR")),
        value(5, tag("MAY")),
        value(6, tag("JUN")),
        value(7, tag("JUL")),
        value(8, tag("AUG")),
        value(9, tag("SEP")),
        value(10, tag("OCT")),
        value(11, tag("NOV")),
        value(12, tag("DEC")),
    ))(input)
}

fn year(input: &str) -> IResult<&str, i32> {
    verify(
        map_res(verify(digit1, |s: &str| s.len() <= 4), |s: &str| s.parse::<i32>()),
        |y: &i32| *y > 0,
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_exact_full_date() {
        let date = DateValue::parse("27 NOV 1852");
        assert_eq!(date.kind(), DateKind::Exact);
        assert_eq!(date.start(), Some(CalendarPoint::full(1852, 11, 27)));
        assert_eq!(date.exact_date(), NaiveDate::from_ymd_opt(1852, 11, 27));
        assert_eq!(date.original(), "27 NOV 1852");
    }

    #[test]
    fn test_parse_partial_precision() {
        assert_eq!(DateValue::parse("nov 1852").start(), Some(CalendarPoint::month(1852, 11)));
        assert_eq!(DateValue::parse("1852").start(), Some(CalendarPoint::year(1852)));
        assert_eq!(DateValue::parse("1852").exact_date(), None);
    }

    #[test]
    fn test_parse_qualifiers() {
        assert_eq!(DateValue::parse("ABT 1850").kind(), DateKind::Approximate);
        assert_eq!(DateValue::parse("est 1850").form(), DateForm::Estimated);
        assert_eq!(DateValue::parse("BEF 1 JAN 1900").kind(), DateKind::Before);
        assert_eq!(DateValue::parse("AFT 1900").kind(), DateKind::After);
        assert_eq!(DateValue::parse("FROM 1900").kind(), DateKind::After);
        assert_eq!(DateValue::parse("TO 1900").kind(), DateKind::Before);
    }

    #[test]
    fn test_parse_ranges() {
        let range = DateValue::parse("BET 1840 AND  MAR 1845");
        assert_eq!(range.kind(), DateKind::Range);
        assert_eq!(range.start(), Some(CalendarPoint::year(1840)));
        assert_eq!(range.end(), Some(CalendarPoint::month(1845, 3)));

        let period = DateValue::parse("FROM 1840 TO 1845");
        assert_eq!(period.kind(), DateKind::Range);
        assert_eq!(period.form(), DateForm::FromTo);
    }

    #[test]
    fn test_range_bounds_of_mixed_precision() {
        let range = DateValue::parse("BET 1 JAN 1850 AND 1850");
        assert_eq!(range.kind(), DateKind::Range);
        assert_eq!(range.end(), Some(CalendarPoint::year(1850)));

        assert_eq!(DateValue::parse("FROM 1850 TO MAR 1850").kind(), DateKind::Range);
        assert_eq!(DateValue::parse("BET DEC 1850 AND 30 NOV 1850").kind(), DateKind::Unknown);
    }

    #[test]
    fn test_malformed_input_is_unknown() {
        for text in ["31 FEB 1900", "BET 1900 AND 1850", "1699/00", "INT 1850 (about then)", "sometime", "JANUARY 1900", ""] {
            let date = DateValue::parse(text);
            assert_eq!(date.kind(), DateKind::Unknown, "{}", text);
            assert_eq!(date.original(), text);
        }
    }

    #[test]
    fn test_format_normalizes_whitespace_and_case() {
        assert_eq!(DateValue::parse(" abt   3 mar 1850 ").format(), "ABT 3 MAR 1850");
        assert_eq!(DateValue::parse("bet 1840 and 1845").format(), "BET 1840 AND 1845");
        assert_eq!(DateValue::parse("Spring of   1850").format(), "Spring of 1850");
    }

    #[test]
    fn test_semantic_equality_ignores_original_text() {
        assert_eq!(DateValue::parse("27 nov 1852"), DateValue::parse("27 NOV 1852"));
        assert_ne!(DateValue::parse("ABT 1850"), DateValue::parse("EST 1850"));
        assert_eq!(DateValue::parse("sometime"), DateValue::parse("SOMETIME"));
    }

    #[test]
    fn test_ordering_by_earliest_bound_then_kind() {
        let mut dates = vec![
            DateValue::parse("AFT 1850"),
            DateValue::parse("gibberish"),
            DateValue::parse("BET 1850 AND 1860"),
            DateValue::parse("1849"),
            DateValue::parse("ABT 1850"),
            DateValue::parse("1850"),
            DateValue::parse("BEF 1850"),
        ];
        dates.sort();
        let formatted: Vec<String> = dates.iter().map(DateValue::format).collect();
        assert_eq!(
            formatted,
            vec!["1849", "1850", "ABT 1850", "BET 1850 AND 1860", "BEF 1850", "AFT 1850", "gibberish"]
        );
    }

    fn date_text() -> impl Strategy<Value = String> {
        let point = (1000i32..2100, 0u32..13, 0u32..29).prop_map(|(y, m, d)| match (m, d) {
            (0, _) => format!("{}", y),
            (m, 0) => format!("{} {}", MONTHS[(m - 1) as usize], y),
            (m, d) => format!("{} {} {}", d, MONTHS[(m - 1) as usize], y),
        });
        let prefix = prop::sample::select(vec!["", "ABT ", "CAL ", "EST ", "BEF ", "AFT ", "FROM ", "TO "]);
        prop_oneof![
            (prefix, point.clone()).prop_map(|(p, d)| format!("{}{}", p, d)),
            (point.clone(), point).prop_map(|(a, b)| format!("BET {} AND {}", a, b)),
            "[a-z ]{0,12}",
        ]
    }

    proptest! {
        #[test]
        fn prop_parse_format_is_idempotent(text in date_text()) {
            let parsed = DateValue::parse(&text);
            let reparsed = DateValue::parse(&parsed.format());
            prop_assert_eq!(reparsed, parsed);
        }
    }
}
