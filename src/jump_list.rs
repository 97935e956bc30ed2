use std::collections::VecDeque;

/// Page history of explicit jumps (bookmark and page-number navigation)
#[derive(Debug)]
pub struct JumpList {
    entries: VecDeque<usize>,
    /// Index of the entry being visited; `None` means at the newest entry
    position: Option<usize>,
    max_size: usize,
}

impl Default for JumpList {
    fn default() -> Self {
        Self::new(50)
    }
}

impl JumpList {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size),
            position: None,
            max_size: max_size.max(1),
        }
    }

    /// Record the page a jump is leaving from
    pub fn push(&mut self, page: usize) {
        if let Some(pos) = self.position.take() {
            self.entries.truncate(pos + 1);
        }
        if self.entries.back() == Some(&page) {
            return;
        }
        self.push_bounded(page);
    }

    /// Step back in history.
    ///
    /// At the head, `current_page` is recorded first so a later
    /// [`JumpList::jump_forward`] can return to it.
    pub fn jump_back(&mut self, current_page: usize) -> Option<usize> {
        match self.position {
            None => {
                if self.entries.back() != Some(&current_page) {
                    self.push_bounded(current_page);
                }
                let pos = self.entries.len().checked_sub(2)?;
                self.position = Some(pos);
                self.entries.get(pos).copied()
            }
            Some(pos) if pos > 0 => {
                self.position = Some(pos - 1);
                self.entries.get(pos - 1).copied()
            }
            Some(_) => None,
        }
    }

    pub fn jump_forward(&mut self) -> Option<usize> {
        let pos = self.position?;
        if pos + 1 < self.entries.len() {
            let next = pos + 1;
            self.position = if next + 1 == self.entries.len() {
                None
            } else {
                Some(next)
            };
            self.entries.get(next).copied()
        } else {
            self.position = None;
            self.entries.back().copied()
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn push_bounded(&mut self, page: usize) {
        self.entries.push_back(page);
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
    }
}
