use anyhow::{bail, Context, Result};
use log::{debug, trace};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

/// The nine base metrics read from a sleep report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricField {
    Ahi,
    Odi,
    AvgSpo2,
    MinSpo2,
    SleepTimeHours,
    SupinePct,
    ApneaIndex,
    ApneaCount,
    ArousalIndex,
}

impl MetricField {
    pub const ALL: [MetricField; 9] = [
        MetricField::Ahi,
        MetricField::Odi,
        MetricField::AvgSpo2,
        MetricField::MinSpo2,
        MetricField::SleepTimeHours,
        MetricField::SupinePct,
        MetricField::ApneaIndex,
        MetricField::ApneaCount,
        MetricField::ArousalIndex,
    ];

    pub fn key(self) -> &'static str {
        match self {
            MetricField::Ahi => "ahi",
            MetricField::Odi => "odi",
            MetricField::AvgSpo2 => "avg_spo2",
            MetricField::MinSpo2 => "min_spo2",
            MetricField::SleepTimeHours => "sleep_time_hours",
            MetricField::SupinePct => "supine_pct",
            MetricField::ApneaIndex => "apnea_index",
            MetricField::ApneaCount => "apnea_count",
            MetricField::ArousalIndex => "arousal_index",
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// How the captured text of a matched pattern becomes a number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueParser {
    Float,
    Integer,
    /// Two captures, `<hours>h <minutes>m`, folded into fractional hours.
    HoursMinutes,
}

impl ValueParser {
    fn captures_needed(self) -> usize {
        match self {
            ValueParser::HoursMinutes => 2,
            ValueParser::Float | ValueParser::Integer => 1,
        }
    }

    fn parse(self, caps: &Captures) -> Option<f64> {
        let group = |i: usize| caps.get(i).map(|m| m.as_str().trim());
        match self {
            ValueParser::Float => group(1)?.parse::<f64>().ok(),
            ValueParser::Integer => group(1)?.parse::<u64>().ok().map(|v| v as f64),
            ValueParser::HoursMinutes => {
                let hours = group(1)?.parse::<f64>().ok()?;
                let minutes = group(2)?.parse::<f64>().ok()?;
                Some(hours + minutes / 60.0)
            }
        }
    }
}

/// One declarative extraction rule: where a field lives in the report text and
/// what to use when it cannot be found.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field: MetricField,
    pub pattern: String,
    pub parser: ValueParser,
    pub default: f64,
}

impl FieldRule {
    pub fn new(field: MetricField, pattern: &str, parser: ValueParser, default: f64) -> Self {
        Self {
            field,
            pattern: pattern.to_string(),
            parser,
            default,
        }
    }

    /// Rules for the Nox SAS report export. Labels may carry a leading quote
    /// left over from the CSV export.
    pub fn builtin() -> Vec<FieldRule> {
        use MetricField::*;
        use ValueParser::*;
        vec![
            FieldRule::new(Ahi, r#""?Apneas \+ Hypopneas \(AH\):\s+(\d+\.?\d*)\s*/h"#, Float, 28.9),
            FieldRule::new(
                Odi,
                r#""?Oxygen Desaturation Index \(ODI\):\s+(\d+\.?\d*)\s*/h"#,
                Float,
                22.6,
            ),
            FieldRule::new(AvgSpo2, r#""?Average SpO2:\s+(\d+\.?\d*)\s*%"#, Float, 92.7),
            FieldRule::new(MinSpo2, r#""?Minimum SpO2:\s+(\d+\.?\d*)\s*%"#, Float, 51.0),
            FieldRule::new(
                SleepTimeHours,
                r#""?Total Sleep Time \(TST\):\s+(\d+)h\s+(\d+)m"#,
                HoursMinutes,
                8.5,
            ),
            FieldRule::new(SupinePct, r#""?Supine \(in TST\):.*?(\d+\.?\d*)\s*%"#, Float, 29.1),
            // Index and count both live on `Apneas:` lines; they are matched
            // independently and either may be missing.
            FieldRule::new(ApneaIndex, r#"(?m)^"?Apneas:\s+(\d+\.?\d*)\s*/h"#, Float, 16.8),
            FieldRule::new(ApneaCount, r#"(?m)"?Apneas:.*?(\d+)\s*$"#, Integer, 143.0),
            FieldRule::new(
                ArousalIndex,
                r#""?Arousal index in TST:\s+(\d+\.?\d*)/h"#,
                Float,
                0.0,
            ),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldStatus {
    Matched,
    Defaulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FieldOutcome {
    pub field: MetricField,
    pub status: FieldStatus,
    pub value: f64,
}

/// Summary metrics of one recorded night.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReportMetrics {
    pub ahi: f64,
    pub odi: f64,
    pub avg_spo2: f64,
    pub min_spo2: f64,
    pub sleep_time_hours: f64,
    pub supine_pct: f64,
    pub apnea_index: f64,
    pub apnea_count: u32,
    pub arousal_index: f64,
    pub desat_events: u32,
    pub awakenings: u32,
}

impl ReportMetrics {
    /// Builds the record from resolved base values (indexed like
    /// `MetricField::ALL`) and computes the derived counts.
    fn from_base(values: &[f64; 9]) -> Self {
        let get = |field: MetricField| values[field.index()];
        let odi = get(MetricField::Odi);
        let sleep_time_hours = get(MetricField::SleepTimeHours);
        let arousal_index = get(MetricField::ArousalIndex);

        Self {
            ahi: get(MetricField::Ahi),
            odi,
            avg_spo2: get(MetricField::AvgSpo2),
            min_spo2: get(MetricField::MinSpo2),
            sleep_time_hours,
            supine_pct: get(MetricField::SupinePct),
            apnea_index: get(MetricField::ApneaIndex),
            apnea_count: round_count(get(MetricField::ApneaCount)),
            arousal_index,
            desat_events: round_count(odi * sleep_time_hours),
            awakenings: round_count(arousal_index * sleep_time_hours / 10.0).max(1),
        }
    }

    pub fn get(&self, field: MetricField) -> f64 {
        match field {
            MetricField::Ahi => self.ahi,
            MetricField::Odi => self.odi,
            MetricField::AvgSpo2 => self.avg_spo2,
            MetricField::MinSpo2 => self.min_spo2,
            MetricField::SleepTimeHours => self.sleep_time_hours,
            MetricField::SupinePct => self.supine_pct,
            MetricField::ApneaIndex => self.apnea_index,
            MetricField::ApneaCount => self.apnea_count as f64,
            MetricField::ArousalIndex => self.arousal_index,
        }
    }
}

fn round_count(value: f64) -> u32 {
    // `as` saturates, NaN lands on 0
    value.round().max(0.0) as u32
}

/// Result of running the extractor over one report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Extraction {
    pub metrics: ReportMetrics,
    pub fields: Vec<FieldOutcome>,
}

impl Extraction {
    pub fn status(&self, field: MetricField) -> FieldStatus {
        self.fields
            .iter()
            .find(|o| o.field == field)
            .map(|o| o.status)
            .unwrap_or(FieldStatus::Defaulted)
    }

    pub fn all_matched(&self) -> bool {
        self.fields.iter().all(|o| o.status == FieldStatus::Matched)
    }

    pub fn defaulted_fields(&self) -> Vec<MetricField> {
        self.fields
            .iter()
            .filter(|o| o.status == FieldStatus::Defaulted)
            .map(|o| o.field)
            .collect()
    }
}

struct CompiledRule {
    rule: FieldRule,
    regex: Regex,
}

/// Pulls [`ReportMetrics`] out of report text. Never fails: anything it cannot
/// find is replaced by the rule's default.
pub struct ReportExtractor {
    rules: Vec<CompiledRule>,
}

impl ReportExtractor {
    /// Compiles a rule set. Every field must appear exactly once and each
    /// pattern needs the capture groups its parser reads.
    pub fn new(rules: Vec<FieldRule>) -> Result<Self> {
        for field in MetricField::ALL {
            let count = rules.iter().filter(|r| r.field == field).count();
            if count != 1 {
                bail!(
                    "Expected exactly one rule for field '{}', found {}",
                    field.key(),
                    count
                );
            }
        }

        let mut compiled = Vec::with_capacity(rules.len());
        for rule in rules {
            let regex = Regex::new(&rule.pattern).with_context(|| {
                format!("Invalid pattern for field '{}': {}", rule.field.key(), rule.pattern)
            })?;
            // captures_len counts the implicit whole-match group
            let groups = regex.captures_len() - 1;
            if groups < rule.parser.captures_needed() {
                bail!(
                    "Pattern for field '{}' has {} capture group(s), {:?} needs {}",
                    rule.field.key(),
                    groups,
                    rule.parser,
                    rule.parser.captures_needed()
                );
            }
            compiled.push(CompiledRule { rule, regex });
        }
        compiled.sort_by_key(|c| c.rule.field);

        Ok(Self { rules: compiled })
    }

    pub fn rules(&self) -> impl Iterator<Item = &FieldRule> {
        self.rules.iter().map(|c| &c.rule)
    }

    pub fn extract(&self, text: &str) -> Extraction {
        let mut values = [0.0; 9];
        let mut fields = Vec::with_capacity(self.rules.len());

        for CompiledRule { rule, regex } in &self.rules {
            let parsed = regex.captures(text).and_then(|caps| {
                let value = rule.parser.parse(&caps);
                if value.is_none() {
                    debug!(
                        "Matched '{}' but could not parse {:?}",
                        rule.field.key(),
                        caps.get(0).map(|m| m.as_str())
                    );
                }
                value
            });

            let (value, status) = match parsed {
                Some(value) => {
                    trace!("{} = {}", rule.field.key(), value);
                    (value, FieldStatus::Matched)
                }
                None => {
                    debug!("{} not found, using default {}", rule.field.key(), rule.default);
                    (rule.default, FieldStatus::Defaulted)
                }
            };

            values[rule.field.index()] = value;
            fields.push(FieldOutcome {
                field: rule.field,
                status,
                value,
            });
        }

        Extraction {
            metrics: ReportMetrics::from_base(&values),
            fields,
        }
    }

    /// The record produced for a report in which nothing matches.
    pub fn default_record(&self) -> ReportMetrics {
        let mut values = [0.0; 9];
        for c in &self.rules {
            values[c.rule.field.index()] = c.rule.default;
        }
        ReportMetrics::from_base(&values)
    }
}

impl Default for ReportExtractor {
    fn default() -> Self {
        Self::new(FieldRule::builtin()).expect("built-in report rules compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_REPORT: &str = r#"Nox Sleep Report
"Total Sleep Time (TST):   7h 30m
"Apneas + Hypopneas (AH):   12.4 /h
"Oxygen Desaturation Index (ODI):   9.6 /h
"Average SpO2:   94.1 %
"Minimum SpO2:   82 %
"Supine (in TST):   3h 10m   41.5 %
Apneas:   6.2 /h
"Central Apneas:   count   47
"Arousal index in TST:   14.0/h
"#;

    #[test]
    fn builtin_rules_compile() {
        let extractor = ReportExtractor::default();
        assert_eq!(extractor.rules().count(), 9);
    }

    #[test]
    fn extracts_every_field_from_full_report() {
        let extraction = ReportExtractor::default().extract(SAMPLE_REPORT);
        let m = extraction.metrics;

        assert!(extraction.all_matched(), "{:?}", extraction.defaulted_fields());
        assert_eq!(m.ahi, 12.4);
        assert_eq!(m.odi, 9.6);
        assert_eq!(m.avg_spo2, 94.1);
        assert_eq!(m.min_spo2, 82.0);
        assert_eq!(m.sleep_time_hours, 7.5);
        assert_eq!(m.supine_pct, 41.5);
        assert_eq!(m.apnea_index, 6.2);
        assert_eq!(m.apnea_count, 47);
        assert_eq!(m.arousal_index, 14.0);
        assert_eq!(m.desat_events, 72);
        assert_eq!(m.awakenings, 11); // 14 * 7.5 / 10 = 10.5
    }

    #[test]
    fn empty_text_gives_default_record() {
        let extractor = ReportExtractor::default();
        let extraction = extractor.extract("");

        assert_eq!(extraction.metrics, extractor.default_record());
        assert_eq!(extraction.defaulted_fields().len(), 9);

        let m = extraction.metrics;
        assert_eq!(m.ahi, 28.9);
        assert_eq!(m.odi, 22.6);
        assert_eq!(m.avg_spo2, 92.7);
        assert_eq!(m.min_spo2, 51.0);
        assert_eq!(m.sleep_time_hours, 8.5);
        assert_eq!(m.supine_pct, 29.1);
        assert_eq!(m.apnea_index, 16.8);
        assert_eq!(m.apnea_count, 143);
        assert_eq!(m.arousal_index, 0.0);
        assert_eq!(m.desat_events, 192);
        assert_eq!(m.awakenings, 1);
    }

    #[test]
    fn only_ahi_present() {
        let extractor = ReportExtractor::default();
        let extraction = extractor.extract("Apneas + Hypopneas (AH):   5.2 /h");

        assert_eq!(extraction.metrics.ahi, 5.2);
        assert_eq!(extraction.status(MetricField::Ahi), FieldStatus::Matched);
        let defaults = extractor.default_record();
        for field in MetricField::ALL.into_iter().skip(1) {
            assert_eq!(extraction.status(field), FieldStatus::Defaulted);
            assert_eq!(extraction.metrics.get(field), defaults.get(field));
        }
    }

    #[test]
    fn apnea_index_requires_line_start() {
        let extractor = ReportExtractor::default();
        let extraction = extractor.extract("Obstructive Apneas:   3.0 /h   21\n");

        assert_eq!(extraction.status(MetricField::ApneaIndex), FieldStatus::Defaulted);
        // The count pattern is unanchored and still finds the trailing number
        assert_eq!(extraction.metrics.apnea_count, 21);
    }

    #[test]
    fn apnea_count_takes_trailing_integer() {
        let extractor = ReportExtractor::default();
        let extraction = extractor.extract("Apneas:   16.8 /h   143\r\n");

        assert_eq!(extraction.metrics.apnea_index, 16.8);
        assert_eq!(extraction.metrics.apnea_count, 143);
    }

    #[test]
    fn rejects_duplicate_and_missing_fields() {
        let mut rules = FieldRule::builtin();
        rules.pop();
        assert!(ReportExtractor::new(rules).is_err());

        let mut rules = FieldRule::builtin();
        rules.push(rules[0].clone());
        assert!(ReportExtractor::new(rules).is_err());
    }

    #[test]
    fn rejects_pattern_without_enough_groups() {
        let mut rules = FieldRule::builtin();
        rules[4].pattern = r"Total Sleep Time: (\d+)h".to_string();
        let err = ReportExtractor::new(rules).err().unwrap();
        assert!(err.to_string().contains("sleep_time_hours"));
    }

    #[test]
    fn unparseable_capture_falls_back_to_default() {
        let mut rules = FieldRule::builtin();
        rules[0].pattern = r"AHI: (\S+)".to_string();
        let extractor = ReportExtractor::new(rules).unwrap();
        let extraction = extractor.extract("AHI: n/a");

        assert_eq!(extraction.status(MetricField::Ahi), FieldStatus::Defaulted);
        assert_eq!(extraction.metrics.ahi, 28.9);
    }
}
