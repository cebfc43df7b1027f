//! Recording input backend for tests

use std::collections::HashSet;
use std::sync::Mutex;

use super::{InputBackend, InputError, Key};

/// A call made against the fake backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    Press(Key),
    Release(Key),
}

#[derive(Default)]
struct FakeState {
    held: HashSet<Key>,
    right_button: Option<bool>,
    calls: Vec<Call>,
    fail_press: bool,
    fail_release: bool,
    fail_sample: bool,
}

/// Input backend whose physical state is set by the test
#[derive(Default)]
pub struct FakeBackend {
    state: Mutex<FakeState>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hold(&self, key: Key) {
        self.state.lock().unwrap().held.insert(key);
    }

    pub fn lift(&self, key: Key) {
        self.state.lock().unwrap().held.remove(&key);
    }

    pub fn set_right_button(&self, pressed: Option<bool>) {
        self.state.lock().unwrap().right_button = pressed;
    }

    pub fn fail_press(&self, fail: bool) {
        self.state.lock().unwrap().fail_press = fail;
    }

    pub fn fail_release(&self, fail: bool) {
        self.state.lock().unwrap().fail_release = fail;
    }

    pub fn fail_sample(&self, fail: bool) {
        self.state.lock().unwrap().fail_sample = fail;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn presses(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Press(_))).count()
    }

    pub fn releases(&self) -> usize {
        self.calls().iter().filter(|c| matches!(c, Call::Release(_))).count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }
}

impl InputBackend for FakeBackend {
    fn is_pressed(&self, key: Key) -> Result<bool, InputError> {
        let state = self.state.lock().unwrap();
        if state.fail_sample {
            return Err(InputError::Unavailable("sampling disabled".into()));
        }
        Ok(state.held.contains(&key))
    }

    fn press(&self, key: Key) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Press(key));
        if state.fail_press {
            return Err(InputError::EventCreation(key));
        }
        Ok(())
    }

    fn release(&self, key: Key) -> Result<(), InputError> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::Release(key));
        if state.fail_release {
            return Err(InputError::EventCreation(key));
        }
        Ok(())
    }

    fn is_right_button_pressed(&self) -> Option<bool> {
        self.state.lock().unwrap().right_button
    }
}
