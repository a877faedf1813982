use logscope_types::{LevelFilter, Severity};

/// Markers checked in priority order; the first hit wins
const SEVERITY_MARKERS: [(Severity, [&str; 2]); 4] = [
    (Severity::Error, [" ERROR ", "[ERROR]"]),
    (Severity::Warn, [" WARN ", "[WARN]"]),
    (Severity::Info, [" INFO ", "[INFO]"]),
    (Severity::Debug, [" DEBUG ", "[DEBUG]"]),
];

/// Classify a raw line by its literal level marker, defaulting to info
pub fn classify(line: &str) -> Severity {
    SEVERITY_MARKERS
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| line.contains(m)))
        .map(|(severity, _)| *severity)
        .unwrap_or_default()
}

/// Counts per severity
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LevelCounts {
    pub error: usize,
    pub warn: usize,
    pub info: usize,
    pub debug: usize,
}

impl LevelCounts {
    pub fn total(&self) -> usize {
        self.error + self.warn + self.info + self.debug
    }

    pub fn get(&self, severity: Severity) -> usize {
        match severity {
            Severity::Error => self.error,
            Severity::Warn => self.warn,
            Severity::Info => self.info,
            Severity::Debug => self.debug,
        }
    }

    /// Count for a level tab
    pub fn for_filter(&self, filter: LevelFilter) -> usize {
        match filter {
            LevelFilter::All => self.total(),
            LevelFilter::Only(severity) => self.get(severity),
        }
    }

    fn increment(&mut self, severity: Severity) {
        match severity {
            Severity::Error => self.error += 1,
            Severity::Warn => self.warn += 1,
            Severity::Info => self.info += 1,
            Severity::Debug => self.debug += 1,
        }
    }
}

/// Count lines per severity over an unfiltered sequence
pub fn level_counts<I, S>(lines: I) -> LevelCounts
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut counts = LevelCounts::default();
    for line in lines {
        counts.increment(classify(line.as_ref()));
    }
    counts
}

/// Per-char Unicode lowercase, so every folded char maps back to one source char
fn fold_case(s: &str) -> String {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Level tab plus case-insensitive substring query
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogFilter {
    level: LevelFilter,

    /// Original query
    query: String,

    /// Lowercased query, empty = match everything
    needle: String,
}

impl LogFilter {
    pub fn new(level: LevelFilter, query: &str) -> Self {
        Self {
            level,
            query: query.to_string(),
            needle: fold_case(query),
        }
    }

    /// Check if a line passes both the level and the text condition
    pub fn matches(&self, line: &str) -> bool {
        if !self.level.allows(classify(line)) {
            return false;
        }
        self.needle.is_empty() || fold_case(line).contains(&self.needle)
    }

    /// Byte ranges of query hits in `line` (for highlighting).
    ///
    /// Ranges are widened to whole source chars, so they always land on char
    /// boundaries even when folding changes a char's byte length.
    pub fn find_matches(&self, line: &str) -> Vec<(usize, usize)> {
        if self.needle.is_empty() {
            return Vec::new();
        }

        // Source char span for every byte of the folded line
        let mut folded = String::with_capacity(line.len());
        let mut origin = Vec::with_capacity(line.len());
        for (start, c) in line.char_indices() {
            let end = start + c.len_utf8();
            for lower in c.to_lowercase() {
                folded.push(lower);
                origin.extend(std::iter::repeat_n((start, end), lower.len_utf8()));
            }
        }

        let mut matches: Vec<(usize, usize)> = Vec::new();
        let mut from = 0;
        while let Some(pos) = folded[from..].find(&self.needle) {
            let hit = from + pos;
            from = hit + self.needle.len();

            let start = origin[hit].0;
            let end = origin[from - 1].1;
            match matches.last_mut() {
                Some(last) if start < last.1 => last.1 = last.1.max(end),
                _ => matches.push((start, end)),
            }
        }
        matches
    }

    pub fn level(&self) -> LevelFilter {
        self.level
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// Check if filter matches everything
    pub fn is_empty(&self) -> bool {
        self.level == LevelFilter::All && self.query.is_empty()
    }
}

/// Lazily filter `lines` by level and query; never touches the source
pub fn filter<'a, I>(
    lines: I,
    level: LevelFilter,
    query: &str,
) -> impl Iterator<Item = &'a str> + use<'a, I>
where
    I: IntoIterator<Item = &'a String>,
{
    let filter = LogFilter::new(level, query);
    lines
        .into_iter()
        .map(String::as_str)
        .filter(move |line| filter.matches(line))
}
