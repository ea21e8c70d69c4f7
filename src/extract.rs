use chrono::{DateTime, Utc};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use crate::models::ApplicationRecord;

/// Where to find each field on one job board. Every selector may be a
/// comma-separated list; the first element matched in document order wins.
#[derive(Debug)]
pub struct SiteConfig {
    pub domain: &'static str,
    pub company: &'static str,
    pub title: &'static str,
    pub location: &'static str,
    pub description: &'static str,
}

pub static SITES: [SiteConfig; 9] = [
    SiteConfig {
        domain: "linkedin.com",
        company: ".job-details-jobs-unified-top-card__company-name, .topcard__org-name-link, .jobs-unified-top-card__company-name a",
        title: ".job-details-jobs-unified-top-card__job-title, .topcard__title, .jobs-unified-top-card__job-title",
        location: ".job-details-jobs-unified-top-card__bullet, .topcard__flavor--bullet, .jobs-unified-top-card__bullet",
        description: ".jobs-description, .jobs-description-content__text",
    },
    SiteConfig {
        domain: "indeed.com",
        company: "[data-company-name=\"true\"], .jobsearch-InlineCompanyRating-companyHeader a",
        title: ".jobsearch-JobInfoHeader-title, h1.jobsearch-JobInfoHeader-title",
        location: ".jobsearch-JobInfoHeader-subtitle div",
        description: "#jobDescriptionText, .jobsearch-jobDescriptionText",
    },
    SiteConfig {
        domain: "glassdoor.com",
        company: "[data-test=\"employerName\"], .employer-name",
        title: "[data-test=\"jobTitle\"], .job-title",
        location: "[data-test=\"location\"], .job-location",
        description: ".jobDescriptionContent, .desc",
    },
    SiteConfig {
        domain: "monster.com",
        company: ".company-name, [data-test-id=\"companyName\"]",
        title: ".job-title, h1[data-test-id=\"jobTitle\"]",
        location: ".location, [data-test-id=\"location\"]",
        description: ".job-description",
    },
    SiteConfig {
        domain: "ziprecruiter.com",
        company: ".hiring_company_text, [data-test=\"companyName\"]",
        title: ".job_title, h1.job-title",
        location: ".location, .job-location",
        description: ".job-description",
    },
    SiteConfig {
        domain: "dice.com",
        company: ".employer, [data-cy=\"companyNameLink\"]",
        title: ".jobTitle, h1[data-cy=\"jobTitle\"]",
        location: ".location, [data-cy=\"location\"]",
        description: ".job-description",
    },
    SiteConfig {
        domain: "lever.co",
        company: ".company-name, .main-header-text",
        title: ".posting-headline h2",
        location: ".location, .posting-categories .location",
        description: ".content",
    },
    SiteConfig {
        domain: "ashbyhq.com",
        company: ".ashby-job-posting-heading__company-name",
        title: ".ashby-job-posting-heading__title",
        location: ".ashby-job-posting-info-item",
        description: ".ashby-job-posting-description",
    },
    SiteConfig {
        domain: "greenhouse.io",
        company: "#header .company-name",
        title: ".app-title, h1.app-title",
        location: ".location",
        description: "#content",
    },
];

/// Substring match of the hostname against the known boards, in table order.
pub fn identify_site(hostname: &str) -> Option<&'static SiteConfig> {
    SITES.iter().find(|site| hostname.contains(site.domain))
}

pub fn hostname(page_url: &str) -> Option<String> {
    reqwest::Url::parse(page_url)
        .ok()?
        .host_str()
        .map(str::to_string)
}

fn select_text(document: &Html, selector: &str) -> Option<String> {
    let parsed = match Selector::parse(selector) {
        Ok(s) => s,
        Err(e) => {
            warn!(selector, error = %e, "bad selector");
            return None;
        }
    };
    let element = document.select(&parsed).next()?;
    let text = element.text().collect::<String>();
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Pulls a candidate record out of `html` using `site`'s selectors. Company
/// and title are mandatory; without either there is no candidate.
pub fn extract(
    html: &str,
    page_url: &str,
    site: &SiteConfig,
    now: DateTime<Utc>,
) -> Option<ApplicationRecord> {
    let document = Html::parse_document(html);

    let company = select_text(&document, site.company);
    let title = select_text(&document, site.title);
    let (Some(company), Some(title)) = (company, title) else {
        debug!(site = site.domain, page_url, "company or title missing");
        return None;
    };

    let location = select_text(&document, site.location);
    let description = select_text(&document, site.description);
    let source = hostname(page_url).unwrap_or_default();

    Some(ApplicationRecord::candidate(
        &company,
        &title,
        location.as_deref(),
        description.as_deref(),
        page_url,
        &source,
        now,
    ))
}

/// Identifies the board from `page_url`, then extracts.
pub fn capture(html: &str, page_url: &str, now: DateTime<Utc>) -> Option<ApplicationRecord> {
    let host = hostname(page_url)?;
    let Some(site) = identify_site(&host) else {
        debug!(host, "not a known job board");
        return None;
    };
    extract(html, page_url, site, now)
}

#[derive(Debug, Clone, PartialEq)]
pub enum PageEvent {
    Unchanged,
    /// The URL moved; whatever was shown for the old page is gone and this
    /// is the new page's candidate, if any.
    Navigated { candidate: Option<ApplicationRecord> },
}

/// Tracks one tab of a single-page app, where content changes under a new
/// URL without a page load.
#[derive(Debug, Default)]
pub struct PageSession {
    last_url: Option<String>,
    current: Option<ApplicationRecord>,
}

impl PageSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url_changed(&self, url: &str) -> bool {
        self.last_url.as_deref() != Some(url)
    }

    #[cfg(test)]
    pub fn current(&self) -> Option<&ApplicationRecord> {
        self.current.as_ref()
    }

    pub fn observe(&mut self, url: &str, html: &str, now: DateTime<Utc>) -> PageEvent {
        if !self.url_changed(url) {
            return PageEvent::Unchanged;
        }
        self.last_url = Some(url.to_string());
        self.current = capture(html, url, now);
        PageEvent::Navigated {
            candidate: self.current.clone(),
        }
    }
}
