//! Scripted in-memory perception adapter for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::errors::{RunnerError, RunnerResult};
use crate::perception::traits::Perception;
use crate::perception::types::{LabelStyle, Point, TagClass, TaggedObject};

/// FIFO of scripted responses with an optional repeating fallback for when
/// the queue runs dry.
struct StepQueue<T> {
    queue: VecDeque<T>,
    fallback: Option<T>,
}

impl<T: Clone> StepQueue<T> {
    fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            fallback: None,
        }
    }

    fn push(&mut self, item: T) {
        self.queue.push_back(item);
    }

    fn repeat(&mut self, item: T) {
        self.fallback = Some(item);
    }

    fn next(&mut self) -> Option<T> {
        self.queue.pop_front().or_else(|| self.fallback.clone())
    }
}

struct Script {
    primary: StepQueue<Vec<TaggedObject>>,
    secondary: StepQueue<Vec<TaggedObject>>,
    action_labels: StepQueue<Option<String>>,
    fixture_labels: StepQueue<Option<String>>,
    texts: StepQueue<Option<String>>,
    clicks: u32,
    rotations: Vec<i32>,
    pointer_moves: Vec<Point>,
    fail_moves: bool,
}

/// A `Perception` whose responses are scripted per call, in call order.
/// Unscripted calls return "nothing visible" / "no label".
pub struct FakePerception {
    script: Mutex<Script>,
}

impl FakePerception {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                primary: StepQueue::new(),
                secondary: StepQueue::new(),
                action_labels: StepQueue::new(),
                fixture_labels: StepQueue::new(),
                texts: StepQueue::new(),
                clicks: 0,
                rotations: Vec::new(),
                pointer_moves: Vec::new(),
                fail_moves: false,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("fake perception poisoned")
    }

    pub fn push_primary(&self, objs: Vec<TaggedObject>) {
        self.lock().primary.push(objs);
    }

    pub fn repeat_primary(&self, objs: Vec<TaggedObject>) {
        self.lock().primary.repeat(objs);
    }

    pub fn push_secondary(&self, objs: Vec<TaggedObject>) {
        self.lock().secondary.push(objs);
    }

    pub fn repeat_secondary(&self, objs: Vec<TaggedObject>) {
        self.lock().secondary.repeat(objs);
    }

    pub fn push_action_label(&self, label: Option<&str>) {
        self.lock().action_labels.push(label.map(str::to_string));
    }

    pub fn push_fixture_label(&self, label: Option<&str>) {
        self.lock().fixture_labels.push(label.map(str::to_string));
    }

    pub fn push_text(&self, text: Option<&str>) {
        self.lock().texts.push(text.map(str::to_string));
    }

    pub fn fail_moves(&self) {
        self.lock().fail_moves = true;
    }

    pub fn click_count(&self) -> u32 {
        self.lock().clicks
    }

    pub fn rotation_count(&self) -> usize {
        self.lock().rotations.len()
    }

    pub fn pointer_moves(&self) -> Vec<Point> {
        self.lock().pointer_moves.clone()
    }
}

impl Default for FakePerception {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Perception for FakePerception {
    async fn detect(&self, class: TagClass) -> RunnerResult<Vec<TaggedObject>> {
        let mut script = self.lock();
        let queue = match class {
            TagClass::Primary => &mut script.primary,
            TagClass::Secondary => &mut script.secondary,
        };
        Ok(queue.next().unwrap_or_default())
    }

    async fn label_at_pointer(
        &self,
        candidates: &[String],
        style: LabelStyle,
    ) -> RunnerResult<Option<String>> {
        let mut script = self.lock();
        let queue = match style {
            LabelStyle::Action => &mut script.action_labels,
            LabelStyle::Fixture => &mut script.fixture_labels,
        };
        let label = queue.next().flatten();
        // A scripted label outside the probed candidate set reads as no
        // match, the way a real adapter would answer.
        Ok(label.filter(|l| candidates.iter().any(|c| c == l)))
    }

    async fn pointer_text(&self) -> RunnerResult<Option<String>> {
        Ok(self.lock().texts.next().flatten())
    }

    async fn move_pointer(&self, point: Point) -> RunnerResult<()> {
        let mut script = self.lock();
        if script.fail_moves {
            return Err(RunnerError::Perception("pointer device unavailable".into()));
        }
        script.pointer_moves.push(point);
        Ok(())
    }

    async fn click(&self) -> RunnerResult<()> {
        self.lock().clicks += 1;
        Ok(())
    }

    async fn rotate_view(&self, degrees: i32) -> RunnerResult<()> {
        self.lock().rotations.push(degrees);
        Ok(())
    }
}
