use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// One tab in a worktree's tab strip.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Tab {
    pub id: String,
    pub agent_id: String,
    pub label: String,
}

/// Per-worktree tab lists and which tab is active in each.
#[derive(Debug, Default)]
pub struct TabBook {
    tabs: BTreeMap<PathBuf, Vec<Tab>>,
    active: BTreeMap<PathBuf, String>,
    next_id: u64,
}

impl TabBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tabs(&self, worktree: &Path) -> &[Tab] {
        self.tabs.get(worktree).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn get(&self, worktree: &Path, tab_id: &str) -> Option<&Tab> {
        self.tabs(worktree).iter().find(|t| t.id == tab_id)
    }

    pub fn active(&self, worktree: &Path) -> Option<&Tab> {
        let id = self.active.get(worktree)?;
        self.get(worktree, id)
    }

    /// Append a new tab and make it active.
    pub fn add(&mut self, worktree: &Path, agent_id: &str, label: &str) -> Tab {
        self.next_id += 1;
        let tab = Tab {
            id: format!("tab-{}", self.next_id),
            agent_id: agent_id.to_string(),
            label: label.to_string(),
        };
        self.tabs.entry(worktree.to_path_buf()).or_default().push(tab.clone());
        self.active.insert(worktree.to_path_buf(), tab.id.clone());
        tab
    }

    /// Record `tab_id` as active with `agent_id`, adding the tab if it is unknown.
    pub fn touch(&mut self, worktree: &Path, tab_id: &str, agent_id: &str) {
        let tabs = self.tabs.entry(worktree.to_path_buf()).or_default();
        match tabs.iter_mut().find(|t| t.id == tab_id) {
            Some(tab) => tab.agent_id = agent_id.to_string(),
            None => tabs.push(Tab {
                id: tab_id.to_string(),
                agent_id: agent_id.to_string(),
                label: agent_id.to_string(),
            }),
        }
        self.active.insert(worktree.to_path_buf(), tab_id.to_string());
    }

    pub fn set_active(&mut self, worktree: &Path, tab_id: &str) -> Option<&Tab> {
        self.get(worktree, tab_id)?;
        self.active.insert(worktree.to_path_buf(), tab_id.to_string());
        self.get(worktree, tab_id)
    }

    /// Remove a tab. If it was active, the last remaining tab becomes active.
    pub fn remove(&mut self, worktree: &Path, tab_id: &str) -> Option<Tab> {
        let tabs = self.tabs.get_mut(worktree)?;
        let index = tabs.iter().position(|t| t.id == tab_id)?;
        let removed = tabs.remove(index);

        if self.active.get(worktree).map(String::as_str) == Some(tab_id) {
            match tabs.last() {
                Some(last) => {
                    self.active.insert(worktree.to_path_buf(), last.id.clone());
                }
                None => {
                    self.active.remove(worktree);
                }
            }
        }
        if tabs.is_empty() {
            self.tabs.remove(worktree);
        }
        Some(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_activates() {
        let mut book = TabBook::new();
        let wt = Path::new("/wt");
        let first = book.add(wt, "claude", "Claude Code");
        let second = book.add(wt, "shell", "Shell");

        assert_ne!(first.id, second.id);
        assert_eq!(book.tabs(wt).len(), 2);
        assert_eq!(book.active(wt), Some(&second));
    }

    #[test]
    fn test_remove_active_selects_last() {
        let mut book = TabBook::new();
        let wt = Path::new("/wt");
        let a = book.add(wt, "claude", "A");
        let b = book.add(wt, "codex", "B");
        let c = book.add(wt, "gemini", "C");
        book.set_active(wt, &b.id);

        assert_eq!(book.remove(wt, &b.id), Some(b));
        assert_eq!(book.active(wt), Some(&c));

        book.remove(wt, &c.id);
        assert_eq!(book.active(wt), Some(&a));

        book.remove(wt, &a.id);
        assert_eq!(book.active(wt), None);
        assert!(book.tabs(wt).is_empty());
    }

    #[test]
    fn test_remove_inactive_keeps_active() {
        let mut book = TabBook::new();
        let wt = Path::new("/wt");
        let a = book.add(wt, "claude", "A");
        let b = book.add(wt, "codex", "B");

        book.remove(wt, &a.id);
        assert_eq!(book.active(wt), Some(&b));
        assert_eq!(book.remove(wt, "missing"), None);
    }

    #[test]
    fn test_touch_inserts_or_updates() {
        let mut book = TabBook::new();
        let wt = Path::new("/wt");
        book.touch(wt, "t1", "claude");
        book.touch(wt, "t1", "codex");

        assert_eq!(book.tabs(wt).len(), 1);
        assert_eq!(book.active(wt).map(|t| t.agent_id.as_str()), Some("codex"));
    }

    #[test]
    fn test_worktrees_are_independent() {
        let mut book = TabBook::new();
        book.add(Path::new("/a"), "claude", "A");
        assert!(book.tabs(Path::new("/b")).is_empty());
        assert!(book.set_active(Path::new("/b"), "tab-1").is_none());
    }
}
