//! Memory config block for run config summary. Carried over from the
//! teacher near-verbatim; does not display user_id (per-invoke runtime info).

use super::ConfigSection;

pub struct MemoryConfigSummary {
    /// `"none"` | `"short_term"` | `"long_term"` | `"both"`.
    pub mode: String,
    pub short_term: Option<String>,
    pub thread_id: Option<String>,
    pub db_path: Option<String>,
    pub long_term: Option<String>,
    pub long_term_store: Option<String>,
}

impl ConfigSection for MemoryConfigSummary {
    fn section_name(&self) -> &str {
        "Memory config"
    }

    fn entries(&self) -> Vec<(&'static str, String)> {
        let mut out = vec![("mode", self.mode.clone())];
        if let Some(ref st) = self.short_term {
            out.push(("short_term", st.clone()));
        }
        if let Some(ref t) = self.thread_id {
            out.push(("thread_id", t.clone()));
        }
        if let Some(ref p) = self.db_path {
            out.push(("db_path", p.clone()));
        }
        if let Some(ref lt) = self.long_term {
            out.push(("long_term", lt.clone()));
        }
        if let Some(ref s) = self.long_term_store {
            out.push(("store", s.clone()));
        }
        out
    }
}
