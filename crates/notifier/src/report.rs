//! Weekly pull request report.
//!
//! Aggregates PRs created and review comments written during a reporting
//! window into per-repository and per-person rankings, and formats the
//! result as a [`ChatMessage`]. Fetching the raw activity is the `github`
//! crate's job; it maps the API response into [`CreatedPullRequest`] and
//! [`ReviewedPullRequest`] values.

use std::collections::HashMap;

use chrono::{Datelike, Duration as ChronoDuration, FixedOffset, Offset, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::event::DispatchKey;
use crate::formatter::{
    field, Attachment, Block, ChatMessage, MessageMetadata, TextObject, COLOR_PURPLE,
};
use crate::{OrgName, Timestamp};

/// Reports are cut on Fridays at this hour, Korea Standard Time.
pub const REPORT_HOUR: u32 = 16;

/// Entries shown per ranking.
pub const RANKING_LIMIT: usize = 10;

/// Login used when the author account no longer exists.
pub const GHOST_LOGIN: &str = "ghost";

const KST_OFFSET_SECS: i32 = 9 * 3600;

fn kst() -> FixedOffset {
    FixedOffset::east_opt(KST_OFFSET_SECS).unwrap_or_else(|| Utc.fix())
}

// ---------------------------------------------------------------------------
// Window
// ---------------------------------------------------------------------------

/// The reporting period: previous Friday 16:00 KST to this Friday 16:00 KST.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWindow {
    /// Inclusive start.
    pub since: Timestamp,
    /// Inclusive end.
    pub until: Timestamp,
}

impl ReportWindow {
    /// The window whose end is this week's Friday 16:00 KST relative to `now`.
    ///
    /// On a Friday the end is that same day at 16:00, whatever the hour.
    pub fn ending_at(now: Timestamp) -> Self {
        let tz = kst();
        let local = now.as_datetime().with_timezone(&tz);
        let weekday = i64::from(local.weekday().num_days_from_monday());
        let days_until_friday = (4 - weekday).rem_euclid(7);

        let cut = local
            .date_naive()
            .and_hms_opt(REPORT_HOUR, 0, 0)
            .and_then(|naive| tz.from_local_datetime(&naive).single())
            .unwrap_or(local);
        let this_friday = cut + ChronoDuration::days(days_until_friday);
        let last_friday = this_friday - ChronoDuration::days(7);

        Self {
            since: Timestamp::from_utc(last_friday.with_timezone(&Utc)),
            until: Timestamp::from_utc(this_friday.with_timezone(&Utc)),
        }
    }

    /// `true` when `ts` lies within the window, bounds included.
    pub fn contains(&self, ts: Timestamp) -> bool {
        self.since <= ts && ts <= self.until
    }

    /// Renders the window as `MM/DD HH:MM ~ MM/DD HH:MM` in KST.
    pub fn display_kst(&self) -> String {
        let tz = kst();
        format!(
            "{} ~ {}",
            self.since.as_datetime().with_timezone(&tz).format("%m/%d %H:%M"),
            self.until.as_datetime().with_timezone(&tz).format("%m/%d %H:%M")
        )
    }

    /// Formats a bound the way GitHub search qualifiers expect (`YYYY-MM-DDTHH:MM:SSZ`).
    pub fn search_bound(ts: Timestamp) -> String {
        ts.as_datetime().format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

// ---------------------------------------------------------------------------
// Raw activity
// ---------------------------------------------------------------------------

/// A PR created within the window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedPullRequest {
    /// Repository name (without owner).
    pub repository: String,
    /// Author login; `None` for deleted accounts.
    pub author: Option<String>,
}

/// A PR updated within the window, with its most recent reviews.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewedPullRequest {
    /// Repository name (without owner).
    pub repository: String,
    /// Reviews on the PR.
    pub reviews: Vec<Review>,
}

/// One submitted review.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    /// Reviewer login; `None` for deleted accounts.
    pub author: Option<String>,
    /// Submission time; reviews without one are not counted.
    pub created_at: Option<Timestamp>,
    /// Number of inline comments in the review.
    pub comment_count: u64,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Counts keyed by name, remembering first-seen order for stable ranking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Tally {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl Tally {
    fn add(&mut self, name: &str, count: u64) {
        match self.index.get(name) {
            Some(&i) => self.entries[i].1 += count,
            None => {
                self.index.insert(name.to_string(), self.entries.len());
                self.entries.push((name.to_string(), count));
            }
        }
    }

    fn total(&self) -> u64 {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    fn into_ranked(mut self) -> Vec<(String, u64)> {
        // `sort_by` is stable: ties keep first-seen order.
        self.entries.sort_by(|a, b| b.1.cmp(&a.1));
        self.entries
    }
}

/// Aggregated weekly activity, each ranking sorted by count descending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportStats {
    /// PRs created.
    pub total_prs: u64,
    /// Review comments written within the window.
    pub total_comments: u64,
    /// PRs per repository.
    pub pr_by_repo: Vec<(String, u64)>,
    /// PRs per author.
    pub pr_by_person: Vec<(String, u64)>,
    /// Review comments per repository.
    pub comments_by_repo: Vec<(String, u64)>,
    /// Review comments per reviewer.
    pub comments_by_person: Vec<(String, u64)>,
}

/// Aggregates raw activity. Only reviews submitted inside `window` count.
pub fn aggregate(
    created: &[CreatedPullRequest],
    reviewed: &[ReviewedPullRequest],
    window: &ReportWindow,
) -> ReportStats {
    let mut pr_by_repo = Tally::default();
    let mut pr_by_person = Tally::default();
    for pr in created {
        pr_by_repo.add(&pr.repository, 1);
        pr_by_person.add(pr.author.as_deref().unwrap_or(GHOST_LOGIN), 1);
    }

    let mut comments_by_repo = Tally::default();
    let mut comments_by_person = Tally::default();
    for pr in reviewed {
        for review in &pr.reviews {
            let Some(created_at) = review.created_at else {
                continue;
            };
            if !window.contains(created_at) {
                continue;
            }
            let reviewer = review.author.as_deref().unwrap_or(GHOST_LOGIN);
            comments_by_repo.add(&pr.repository, review.comment_count);
            comments_by_person.add(reviewer, review.comment_count);
        }
    }

    ReportStats {
        total_prs: pr_by_repo.total(),
        total_comments: comments_by_repo.total(),
        pr_by_repo: pr_by_repo.into_ranked(),
        pr_by_person: pr_by_person.into_ranked(),
        comments_by_repo: comments_by_repo.into_ranked(),
        comments_by_person: comments_by_person.into_ranked(),
    }
}

/// Renders the top [`RANKING_LIMIT`] entries as numbered lines.
pub fn ranking(entries: &[(String, u64)]) -> String {
    if entries.is_empty() {
        return "No activity".to_string();
    }
    entries
        .iter()
        .take(RANKING_LIMIT)
        .enumerate()
        .map(|(i, (name, count))| format!("{}. {name}: {count}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

/// Dedup identity of the report for `org` over `window`.
pub fn report_key(org: &OrgName, window: &ReportWindow) -> DispatchKey {
    DispatchKey::custom("weekly_report", &[org.as_str(), &window.since.to_string()])
}

/// Formats the report message.
pub fn format_report(org: &OrgName, stats: &ReportStats, window: &ReportWindow) -> ChatMessage {
    let ranked = |title: &str, entries: &[(String, u64)]| Block::Section {
        text: Some(TextObject::mrkdwn(format!("*{title}*\n```\n{}```", ranking(entries)))),
        fields: Vec::new(),
    };

    let blocks = vec![
        Block::Header {
            text: TextObject::plain(format!("📊 Weekly PR report · {org}")),
        },
        Block::Section {
            text: None,
            fields: vec![
                field("Total PRs", &stats.total_prs.to_string()),
                field("Total review comments", &stats.total_comments.to_string()),
            ],
        },
        Block::Divider,
        ranked("📁 PRs by repository", &stats.pr_by_repo),
        ranked("👤 PRs by person", &stats.pr_by_person),
        Block::Divider,
        ranked("📁 Review comments by repository", &stats.comments_by_repo),
        ranked("👤 Review comments by person", &stats.comments_by_person),
        Block::Context {
            elements: vec![TextObject::mrkdwn(format!("📅 {}", window.display_kst()))],
        },
    ];

    ChatMessage {
        text: format!(
            "📊 Weekly PR report for {org}: {} PRs, {} review comments ({})",
            stats.total_prs,
            stats.total_comments,
            window.display_kst()
        ),
        attachments: vec![Attachment {
            color: COLOR_PURPLE.to_string(),
            blocks,
        }],
        metadata: MessageMetadata::for_key(&report_key(org, window)),
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::event::fixtures::ts;

    const FEB_27: &str = "2026-02-27T07:00:00+00:00";
    const MAR_06: &str = "2026-03-06T07:00:00+00:00";

    #[rstest]
    // Wednesday 10:00 KST → ends this Friday.
    #[case::midweek("2026-03-04T01:00:00Z", FEB_27, MAR_06)]
    // Friday 09:00 KST → ends today at 16:00.
    #[case::friday_morning("2026-03-06T00:00:00Z", FEB_27, MAR_06)]
    // Friday 17:00 KST → still ends today at 16:00.
    #[case::friday_evening("2026-03-06T08:00:00Z", FEB_27, MAR_06)]
    // Saturday 01:00 KST (still Friday in UTC) → ends next Friday.
    #[case::saturday_kst("2026-03-06T16:00:00Z", MAR_06, "2026-03-13T07:00:00+00:00")]
    fn window_ends_on_friday_afternoon_kst(
        #[case] now: &str,
        #[case] since: &str,
        #[case] until: &str,
    ) {
        let window = ReportWindow::ending_at(ts(now));
        assert_eq!(window.since.to_string(), since);
        assert_eq!(window.until.to_string(), until);
    }

    #[test]
    fn window_renders_in_kst() {
        let window = ReportWindow::ending_at(ts("2026-03-04T01:00:00Z"));
        assert_eq!(window.display_kst(), "02/27 16:00 ~ 03/06 16:00");
        assert_eq!(ReportWindow::search_bound(window.since), "2026-02-27T07:00:00Z");
    }

    fn created(repo: &str, author: Option<&str>) -> CreatedPullRequest {
        CreatedPullRequest {
            repository: repo.to_string(),
            author: author.map(str::to_string),
        }
    }

    fn review(author: Option<&str>, at: Option<&str>, comments: u64) -> Review {
        Review {
            author: author.map(str::to_string),
            created_at: at.map(ts),
            comment_count: comments,
        }
    }

    #[test]
    fn aggregate_counts_and_ranks() {
        let window = ReportWindow::ending_at(ts("2026-03-04T01:00:00Z"));
        let created = vec![
            created("web", Some("bob")),
            created("api", Some("alice")),
            created("api", Some("alice")),
            created("api", None),
        ];
        let reviewed = vec![
            ReviewedPullRequest {
                repository: "api".to_string(),
                reviews: vec![
                    review(Some("carol"), Some("2026-03-01T00:00:00Z"), 3),
                    // Before the window.
                    review(Some("carol"), Some("2026-02-20T00:00:00Z"), 50),
                    // No timestamp.
                    review(Some("dave"), None, 9),
                ],
            },
            ReviewedPullRequest {
                repository: "web".to_string(),
                reviews: vec![review(None, Some("2026-03-06T07:00:00Z"), 4)],
            },
        ];

        let stats = aggregate(&created, &reviewed, &window);
        assert_eq!(stats.total_prs, 4);
        assert_eq!(stats.total_comments, 7);
        assert_eq!(stats.pr_by_repo, vec![("api".to_string(), 3), ("web".to_string(), 1)]);
        assert_eq!(
            stats.pr_by_person,
            vec![
                ("alice".to_string(), 2),
                ("bob".to_string(), 1),
                ("ghost".to_string(), 1)
            ]
        );
        assert_eq!(stats.comments_by_repo, vec![("web".to_string(), 4), ("api".to_string(), 3)]);
        assert_eq!(
            stats.comments_by_person,
            vec![("ghost".to_string(), 4), ("carol".to_string(), 3)]
        );
    }

    #[test]
    fn ranking_numbers_and_truncates() {
        let entries: Vec<(String, u64)> = (0..12).map(|i| (format!("r{i}"), 12 - i)).collect();
        let text = ranking(&entries);
        assert_eq!(text.lines().count(), RANKING_LIMIT);
        assert!(text.starts_with("1. r0: 12\n2. r1: 11"));
        assert_eq!(ranking(&[]), "No activity");
    }

    #[test]
    fn report_message_has_totals_rankings_and_window() {
        let org = OrgName::new("acme").unwrap();
        let window = ReportWindow::ending_at(ts("2026-03-04T01:00:00Z"));
        let stats = aggregate(&[created("api", Some("alice"))], &[], &window);
        let message = format_report(&org, &stats, &window);
        let out = serde_json::to_string(&message).unwrap();

        assert!(out.contains("*Total PRs:*\\n1"));
        assert!(out.contains("1. api: 1"));
        assert!(out.contains("No activity"));
        assert!(out.contains("02/27 16:00 ~ 03/06 16:00"));
        assert_eq!(message.dispatch_key(), report_key(&org, &window).as_str());
        assert_eq!(message.attachments[0].color, COLOR_PURPLE);
    }
}
