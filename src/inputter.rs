use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};
use tracing::trace;

/// Line editor behind the per-column filter inputs. An edit session starts
/// seeded with the column's committed filter text, ends on Enter (commit)
/// or Esc (cancel).
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    curser_pos: usize, // char index, not byte index
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone, Debug)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub curser_pos: usize,
}

impl Inputter {
    /// Begin a new edit session with the curser at the end of the prefill.
    pub fn start(&mut self, prefill: &str) {
        self.current_input = prefill.to_string();
        self.curser_pos = prefill.chars().count();
        self.finished = false;
        self.canceled = false;
    }

    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        trace!("Filter input key: {key:?}");
        match (key.code, key.modifiers) {
            (KeyCode::Enter, KeyModifiers::NONE) => self.enter(),
            (KeyCode::Esc, KeyModifiers::NONE) => self.escape(),
            (KeyCode::Backspace, KeyModifiers::NONE) => self.backspace(),
            (KeyCode::Left, KeyModifiers::NONE) => self.left(),
            (KeyCode::Right, KeyModifiers::NONE) => self.right(),
            (KeyCode::Home, KeyModifiers::NONE) => self.home(),
            (KeyCode::End, KeyModifiers::NONE) => self.end(),
            (kc, km) => self.key(kc, km),
        }
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            curser_pos: self.curser_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.curser_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.clear();
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.curser_pos > 0 {
            self.curser_pos -= 1;
            let byte_idx = self.getbytepos();
            self.current_input.remove(byte_idx);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.curser_pos = self.curser_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.curser_pos < self.current_input.chars().count() {
            self.curser_pos += 1;
        }
        self.get()
    }

    fn home(&mut self) -> InputResult {
        self.curser_pos = 0;
        self.get()
    }

    fn end(&mut self) -> InputResult {
        self.curser_pos = self.current_input.chars().count();
        self.get()
    }

    fn key(&mut self, code: KeyCode, _modifier: KeyModifiers) -> InputResult {
        if let Some(chr) = code.as_char() {
            let byte_idx = self.getbytepos();
            self.current_input.insert(byte_idx, chr);
            self.curser_pos += 1;
        }
        self.get()
    }

    fn getbytepos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.curser_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::from(code))
    }

    #[test]
    fn typing_appends_at_the_curser() {
        let mut inputter = Inputter::default();
        inputter.start("");
        press(&mut inputter, KeyCode::Char('>'));
        press(&mut inputter, KeyCode::Char('9'));
        let result = press(&mut inputter, KeyCode::Char('0'));
        assert_eq!(result.input, ">90");
        assert_eq!(result.curser_pos, 3);
        assert!(!result.finished);
    }

    #[test]
    fn prefill_seeds_the_session() {
        let mut inputter = Inputter::default();
        inputter.start(">=10");
        let result = press(&mut inputter, KeyCode::Char('0'));
        assert_eq!(result.input, ">=100");
    }

    #[test]
    fn backspace_removes_before_the_curser() {
        let mut inputter = Inputter::default();
        inputter.start("abc");
        press(&mut inputter, KeyCode::Left);
        let result = press(&mut inputter, KeyCode::Backspace);
        assert_eq!(result.input, "ac");
        assert_eq!(result.curser_pos, 1);
    }

    #[test]
    fn enter_commits_and_escape_cancels() {
        let mut inputter = Inputter::default();
        inputter.start("x");
        let committed = press(&mut inputter, KeyCode::Enter);
        assert!(committed.finished);
        assert!(!committed.canceled);
        assert_eq!(committed.input, "x");

        inputter.start("y");
        let canceled = press(&mut inputter, KeyCode::Esc);
        assert!(canceled.finished);
        assert!(canceled.canceled);
        assert_eq!(canceled.input, "");
    }

    #[test]
    fn mid_string_editing_is_char_safe() {
        let mut inputter = Inputter::default();
        inputter.start("s∅re");
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Left);
        let result = press(&mut inputter, KeyCode::Char('o'));
        assert_eq!(result.input, "s∅ore");
    }
}
