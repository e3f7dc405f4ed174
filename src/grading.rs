use crate::models::GradeResult;

struct GradeBand {
    min: f64,
    grade: &'static str,
    explanation: &'static str,
    color: &'static str,
}

// Descending thresholds; the first band the percentage reaches wins.
const GRADE_TABLE: [GradeBand; 10] = [
    GradeBand { min: 90.0, grade: "A+", explanation: "Excellent, outstanding achievement.", color: "emerald" },
    GradeBand { min: 80.0, grade: "A", explanation: "Very good, but with minor deficiencies.", color: "green" },
    GradeBand { min: 75.0, grade: "A-", explanation: "Good, with some areas for improvement.", color: "lime" },
    GradeBand { min: 70.0, grade: "B+", explanation: "Quite good, still room for improvement.", color: "blue" },
    GradeBand {
        min: 65.0,
        grade: "B",
        explanation: "Adequate, with clear weaknesses but an overall understanding.",
        color: "sky",
    },
    GradeBand { min: 60.0, grade: "B-", explanation: "Satisfactory, needs improvement in several areas.", color: "cyan" },
    GradeBand {
        min: 55.0,
        grade: "C+",
        explanation: "Passable, meets minimum requirements but has significant gaps.",
        color: "yellow",
    },
    GradeBand { min: 50.0, grade: "C", explanation: "Pass, but with many areas needing improvement.", color: "amber" },
    GradeBand { min: 40.0, grade: "D", explanation: "Unsatisfactory, significant improvement needed.", color: "orange" },
    GradeBand {
        min: f64::NEG_INFINITY,
        grade: "E",
        explanation: "Fail, did not meet the passing standards, requires substantial improvement.",
        color: "red",
    },
];

fn band_index(percentage: f64) -> usize {
    GRADE_TABLE
        .iter()
        .position(|band| percentage >= band.min)
        .unwrap_or(GRADE_TABLE.len() - 1)
}

/// Maps a score percentage to its letter grade. Total: NaN falls into the lowest band.
pub fn classify(percentage: f64) -> GradeResult {
    let band = &GRADE_TABLE[band_index(percentage)];
    GradeResult {
        grade: band.grade,
        explanation: band.explanation,
        color: band.color,
    }
}
