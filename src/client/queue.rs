// ABOUTME: Bounded blocking event queue backing each client, with
// ABOUTME: drop-oldest overflow so a slow consumer never blocks a reader.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};

use tracing::debug;

use crate::datatypes::{Event, SensorHandle};

/// Events a client can lag behind before the oldest are discarded.
pub const DEFAULT_QUEUE_CAPACITY: usize = 4096;

/// Per-client event queue.
///
/// `push` runs on reader and discovery threads and never blocks: when the
/// queue is full the oldest event is dropped. `wait_next` blocks until an
/// event arrives or the queue is terminated.
pub struct EventQueue {
    events: Mutex<VecDeque<Event>>,
    available: Condvar,
    capacity: usize,
    terminated: AtomicBool,
}

impl EventQueue {
    pub fn new(capacity: usize) -> Self {
        EventQueue {
            events: Mutex::new(VecDeque::new()),
            available: Condvar::new(),
            capacity,
            terminated: AtomicBool::new(false),
        }
    }

    pub fn push(&self, event: Event) {
        if self.terminated.load(Ordering::Acquire) {
            return;
        }
        let mut events = self.events.lock().unwrap();
        if events.len() == self.capacity {
            events.pop_front();
            debug!("event queue full, dropping oldest event");
        }
        events.push_back(event);
        self.available.notify_one();
    }

    /// Blocks until an event is available. Events queued before termination
    /// are still delivered; `None` is returned once the queue is terminated
    /// and empty.
    pub fn wait_next(&self) -> Option<Event> {
        let mut events = self.events.lock().unwrap();
        loop {
            if let Some(event) = events.pop_front() {
                return Some(event);
            }
            if self.terminated.load(Ordering::Acquire) {
                return None;
            }
            events = self.available.wait(events).unwrap();
        }
    }

    pub fn poll_next(&self) -> Option<Event> {
        self.events.lock().unwrap().pop_front()
    }

    /// Unblock all waiters; subsequent pushes are discarded.
    pub fn terminate(&self) {
        self.terminated.store(true, Ordering::Release);
        let _events = self.events.lock().unwrap();
        self.available.notify_all();
    }

    /// Remove every queued event that references the given sensor.
    pub fn drain_sensor(&self, handle: SensorHandle) {
        self.events
            .lock()
            .unwrap()
            .retain(|event| event.sensor != Some(handle));
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::EventKind;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn progress_event(progress: f32) -> Event {
        Event::discovery(EventKind::ListingProgress {
            progress,
            complete: progress == 1.0,
        })
    }

    fn sensor_event(handle: u64) -> Event {
        Event {
            sensor: Some(SensorHandle(handle)),
            component: None,
            kind: EventKind::PropertyChanged(crate::datatypes::PropertyKey::SamplingRate),
        }
    }

    #[test]
    fn fifo_order_and_poll() {
        let queue = EventQueue::new(8);
        queue.push(progress_event(0.25));
        queue.push(progress_event(0.75));

        assert_eq!(queue.poll_next(), Some(progress_event(0.25)));
        assert_eq!(queue.poll_next(), Some(progress_event(0.75)));
        assert_eq!(queue.poll_next(), None);
    }

    #[test]
    fn overflow_drops_oldest() {
        let queue = EventQueue::new(2);
        queue.push(progress_event(0.1));
        queue.push(progress_event(0.2));
        queue.push(progress_event(0.3));

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.poll_next(), Some(progress_event(0.2)));
        assert_eq!(queue.poll_next(), Some(progress_event(0.3)));
    }

    #[test]
    fn wait_next_blocks_until_push() {
        let queue = Arc::new(EventQueue::new(8));
        let pusher = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                queue.push(progress_event(1.0));
            })
        };

        assert_eq!(queue.wait_next(), Some(progress_event(1.0)));
        pusher.join().unwrap();
    }

    #[test]
    fn terminate_unblocks_waiters() {
        let queue = Arc::new(EventQueue::new(8));
        let waiter = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.wait_next())
        };

        thread::sleep(Duration::from_millis(20));
        queue.terminate();
        assert_eq!(waiter.join().unwrap(), None);

        queue.push(progress_event(0.5));
        assert_eq!(queue.poll_next(), None);
    }

    #[test]
    fn drain_removes_only_that_sensors_events() {
        let queue = EventQueue::new(8);
        queue.push(sensor_event(1));
        queue.push(sensor_event(2));
        queue.push(progress_event(0.5));

        queue.drain_sensor(SensorHandle(1));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.poll_next(), Some(sensor_event(2)));
        assert_eq!(queue.poll_next(), Some(progress_event(0.5)));
    }
}
