// Result Aggregator
// Pure classification, cleaning, and scoring over a closed session snapshot

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use schemaflow_types::{
    AggregationMode, FinalResult, Phase, PhaseKind, ResultMetadata, SessionSnapshot, TaskStatus,
};

// ============================================================================
// Heuristic patterns
// ============================================================================

static SCHEMA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)(create\s+(table|index|view|collection)|alter\s+table|primary\s+key|foreign\s+key|"collections"|embedding|dimension:)"#,
    )
    .expect("schema pattern")
});

static PROCEDURAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)(^\s*(fn|def|function|class)\s+\w+|insert\s+into|update\s+\w+\s+set|=>\s*\{)")
        .expect("procedural pattern")
});

static VALIDATION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(validat\w*|verif\w*|test\s+case|edge\s+case|quality\s+check|constraint\s+check)\b")
        .expect("validation pattern")
});

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#{1,6}\s").expect("heading pattern"));

static PROGRESS_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(analyzing|generating|processing|streaming|loading|thinking|working on)\b[^\n]*(\.{3})?\s*$")
        .expect("progress pattern")
});

static SEPARATOR_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*[-=_*]{3,}\s*$").expect("separator pattern"));

static STREAM_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[(stream(ing)?|chunk|partial|progress|loading)[^\]]*\]")
        .expect("stream marker pattern")
});

static SENTENCE_SPACING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([.!?;:])[ \t]{2,}").expect("spacing pattern"));

// ============================================================================
// Scoring configuration
// ============================================================================

/// Empirical multipliers, defaulting to the tuned production values.
/// Configuration, not business logic.
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Applied when content carries 2+ ellipsis sequences
    pub ellipsis_penalty: f64,
    /// Applied to short content (under 50 chars) with no code fence
    pub short_penalty: f64,
    /// Applied when content has no structured markers and trails off without
    /// terminal punctuation
    pub unstructured_penalty: f64,
    pub fence_bonus: f64,
    pub heading_bonus: f64,
    pub schema_bonus: f64,
    /// Applied when content reads as real prose (3+ sentence-like segments)
    pub prose_bonus: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            ellipsis_penalty: 0.9,
            short_penalty: 0.8,
            unstructured_penalty: 0.95,
            fence_bonus: 1.1,
            heading_bonus: 1.05,
            schema_bonus: 1.1,
            prose_bonus: 1.05,
        }
    }
}

// ============================================================================
// Pure passes
// ============================================================================

/// Classify a task into a phase kind: title keywords first, then content
/// heuristics, defaulting to analysis.
pub fn classify(title: &str, content: &str) -> PhaseKind {
    let title = title.to_lowercase();
    if title.contains("analysis") || title.contains("requirement") {
        return PhaseKind::Analysis;
    }
    if title.contains("design") || title.contains("schema") || title.contains("architect") {
        return PhaseKind::Design;
    }
    if title.contains("implement") || title.contains("migration") {
        return PhaseKind::Implementation;
    }
    if title.contains("valid") || title.contains("review") || title.contains("quality") {
        return PhaseKind::Validation;
    }

    if SCHEMA_RE.is_match(content) {
        PhaseKind::Design
    } else if PROCEDURAL_RE.is_match(content) {
        PhaseKind::Implementation
    } else if VALIDATION_RE.is_match(content) {
        PhaseKind::Validation
    } else {
        PhaseKind::Analysis
    }
}

const ROLE_SUFFIXES: &[&str] = &[" Agent", " Analyst", " Assistant", " Worker"];

/// Strip trailing role suffixes and map known raw titles to their canonical
/// display form; anything unrecognized passes through.
pub fn normalize_title(title: &str) -> String {
    let mut base = title.trim();
    for suffix in ROLE_SUFFIXES {
        if let Some(stripped) = base.strip_suffix(suffix) {
            base = stripped.trim_end();
            break;
        }
    }
    match base.to_lowercase().as_str() {
        "analysis" | "requirements analysis" | "requirements" => "Requirements Analysis",
        "design" | "schema design" | "database design" => "Schema Design",
        "implementation" | "implementation plan" | "migration plan" => "Implementation Plan",
        "validation" | "validation report" | "design review" => "Validation Report",
        _ => return base.to_string(),
    }
    .to_string()
}

/// Strip streaming artifacts while preserving fenced code blocks and
/// markdown headers verbatim.
pub fn clean_content(content: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut blank_run = 0usize;

    for line in content.lines() {
        let is_fence_delimiter = line.trim_start().starts_with("```");
        if is_fence_delimiter {
            flush_blanks(&mut out, &mut blank_run);
            out.push(line.to_string());
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            out.push(line.to_string());
            continue;
        }

        if PROGRESS_LINE_RE.is_match(line) || SEPARATOR_LINE_RE.is_match(line) {
            continue;
        }
        let line = STREAM_MARKER_RE.replace_all(line, "");
        let line = SENTENCE_SPACING_RE.replace_all(&line, "$1 ");
        let line = line.trim_end();

        if line.is_empty() {
            blank_run += 1;
            continue;
        }
        flush_blanks(&mut out, &mut blank_run);
        out.push(line.to_string());
    }

    let mut cleaned = out.join("\n").trim().to_string();

    // The incomplete-trailing-line heuristic only applies to plain prose:
    // content with fences or headers keeps its tail untouched.
    if !cleaned.contains("```") && !HEADING_RE.is_match(&cleaned) {
        if let Some(idx) = cleaned.rfind('\n') {
            let last = cleaned[idx + 1..].trim();
            let terminal = last.ends_with(['.', '!', '?', ':']);
            if last.len() < 30 && !terminal {
                cleaned.truncate(idx);
                cleaned = cleaned.trim_end().to_string();
            }
        }
    }

    cleaned
}

fn flush_blanks(out: &mut Vec<String>, blank_run: &mut usize) {
    if *blank_run > 0 && !out.is_empty() {
        // 3+ consecutive blank lines collapse to exactly one; shorter runs
        // pass through.
        let emit = if *blank_run >= 3 { 1 } else { *blank_run };
        for _ in 0..emit {
            out.push(String::new());
        }
    }
    *blank_run = 0;
}

/// Score content quality in [0, 1], starting from 1.0.
pub fn score_confidence(content: &str, config: &ScoringConfig) -> f64 {
    let mut score = 1.0_f64;

    let ellipses = content.matches("...").count() + content.matches('…').count();
    if ellipses >= 2 {
        score *= config.ellipsis_penalty;
    }

    let has_fence = content.contains("```");
    if content.len() < 50 && !has_fence {
        score *= config.short_penalty;
    }

    let has_heading = HEADING_RE.is_match(content);
    let has_schema = SCHEMA_RE.is_match(content);
    let structured = has_fence || has_heading || has_schema;
    let ends_terminal = content
        .trim_end()
        .ends_with(['.', '!', '?', ':']);
    if !structured && !ends_terminal {
        score *= config.unstructured_penalty;
    }

    if has_fence {
        score *= config.fence_bonus;
    }
    if has_heading {
        score *= config.heading_bonus;
    }
    if has_schema || PROCEDURAL_RE.is_match(content) {
        score *= config.schema_bonus;
    }

    let sentences = content
        .split(['.', '!', '?'])
        .filter(|s| s.trim().len() > 10)
        .count();
    if sentences >= 3 {
        score *= config.prose_bonus;
    }

    score.clamp(0.0, 1.0)
}

// ============================================================================
// Aggregator
// ============================================================================

/// Converts a session snapshot into ordered, classified, scored phases.
/// Deterministic: the same snapshot always yields the same phases.
pub struct Aggregator {
    scoring: ScoringConfig,
}

impl Aggregator {
    pub fn new() -> Self {
        Self {
            scoring: ScoringConfig::default(),
        }
    }

    pub fn with_scoring(scoring: ScoringConfig) -> Self {
        Self { scoring }
    }

    pub fn aggregate(&self, snapshot: &SessionSnapshot, mode: AggregationMode) -> FinalResult {
        let mut phases: Vec<Phase> = snapshot
            .tasks
            .iter()
            .filter(|task| match mode {
                AggregationMode::Auto => task.status == TaskStatus::Completed,
                // Forced aggregation salvages partial content from tasks
                // still nominally active.
                AggregationMode::Forced => {
                    task.status == TaskStatus::Completed
                        || (task.status == TaskStatus::Active && !task.content.trim().is_empty())
                }
            })
            .map(|task| {
                let content = clean_content(&task.content);
                Phase {
                    id: task.id.clone(),
                    kind: classify(&task.title, &task.content),
                    title: normalize_title(&task.title),
                    confidence: score_confidence(&content, &self.scoring),
                    agent: task.agent.clone(),
                    content,
                }
            })
            .collect();

        phases.sort_by_key(|p| p.kind.precedence());

        let completed: Vec<_> = snapshot
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .collect();
        let total_duration_ms = match (
            completed.iter().map(|t| t.started_at).min(),
            completed.iter().filter_map(|t| t.ended_at).max(),
        ) {
            (Some(first), Some(last)) => (last - first).num_milliseconds().max(0),
            _ => 0,
        };

        FinalResult {
            session_id: snapshot.session_id.clone(),
            phases,
            metadata: ResultMetadata {
                total_duration_ms,
                completed_count: completed.len(),
                generated_at: Utc::now(),
                mode,
            },
        }
    }
}

impl Default for Aggregator {
    fn default() -> Self {
        Self::new()
    }
}
