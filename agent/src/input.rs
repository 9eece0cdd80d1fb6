// ─────────────────────────────────────────────────────────────
// input.rs – Synthetic mouse / keyboard injection
//   • Tagged InputRecord (converted to the OS union at the edge)
//   • Normalized → absolute (0..65535) coordinate mapping
//   • Single-notch wheel clamping
//   • SendInput backend (Windows)
// ─────────────────────────────────────────────────────────────
use std::ops::BitOr;

use tracing::warn;

/// Upper bound of the OS absolute coordinate space, per axis.
pub const ABSOLUTE_MAX: f64 = 65535.0;

/// One wheel notch.
pub const WHEEL_DELTA: i32 = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MouseFlags(pub u32);

impl MouseFlags {
    pub const MOVE: Self = Self(0x0001);
    pub const LEFT_DOWN: Self = Self(0x0002);
    pub const LEFT_UP: Self = Self(0x0004);
    pub const RIGHT_DOWN: Self = Self(0x0008);
    pub const RIGHT_UP: Self = Self(0x0010);
    pub const WHEEL: Self = Self(0x0800);
    pub const VIRTUAL_DESK: Self = Self(0x4000);
    pub const ABSOLUTE: Self = Self(0x8000);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for MouseFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyFlags(pub u32);

impl KeyFlags {
    pub const NONE: Self = Self(0);
    pub const KEY_UP: Self = Self(0x0002);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseInput {
    pub dx: i32,
    pub dy: i32,
    pub mouse_data: i32,
    pub flags: MouseFlags,
    pub extra_info: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyboardInput {
    pub virtual_key: u16,
    pub flags: KeyFlags,
    pub extra_info: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputRecord {
    Mouse(MouseInput),
    Keyboard(KeyboardInput),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Down,
    Up,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub virtual_key: u16,
    pub direction: Direction,
}

/// Position in the whole virtual desktop, each axis in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    x: f64,
    y: f64,
}

impl NormalizedPoint {
    /// Clamps into range; NaN becomes 0.
    pub fn new(x: f64, y: f64) -> Self {
        fn unit(v: f64) -> f64 {
            if v.is_nan() {
                0.0
            } else {
                v.clamp(0.0, 1.0)
            }
        }
        Self { x: unit(x), y: unit(y) }
    }

    pub fn x(&self) -> f64 {
        self.x
    }

    pub fn y(&self) -> f64 {
        self.y
    }

    /// Truncates toward zero, so 0.5 maps to 32767.
    pub fn to_absolute(&self) -> (i32, i32) {
        ((self.x * ABSOLUTE_MAX) as i32, (self.y * ABSOLUTE_MAX) as i32)
    }
}

/// Sign of `raw_delta` as exactly one notch, or 0.
pub fn wheel_notch(raw_delta: f64) -> i32 {
    if raw_delta > 0.0 {
        WHEEL_DELTA
    } else if raw_delta < 0.0 {
        -WHEEL_DELTA
    } else {
        0
    }
}

/// The OS batch-submit primitive.
pub trait InputBackend {
    /// Submits `records` in order and returns how many the OS accepted.
    fn send(&self, records: &[InputRecord]) -> u32;

    /// Extra-info value that tags injected events as synthetic.
    fn message_extra_info(&self) -> usize;
}

/// Injects mouse and keyboard events into the current input desktop.
///
/// Stateless; callers must submit events in arrival order.
pub struct InputInjector<B> {
    backend: B,
}

impl<B: InputBackend> InputInjector<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn send_left_mouse_down(&self, x: i32, y: i32) -> u32 {
        self.button(MouseFlags::LEFT_DOWN, x, y)
    }

    pub fn send_left_mouse_up(&self, x: i32, y: i32) -> u32 {
        self.button(MouseFlags::LEFT_UP, x, y)
    }

    pub fn send_right_mouse_down(&self, x: i32, y: i32) -> u32 {
        self.button(MouseFlags::RIGHT_DOWN, x, y)
    }

    pub fn send_right_mouse_up(&self, x: i32, y: i32) -> u32 {
        self.button(MouseFlags::RIGHT_UP, x, y)
    }

    /// Absolute move over the full virtual desktop. The OS applies the
    /// multi-monitor origin itself, so no offset is added here.
    pub fn send_mouse_move(&self, point: NormalizedPoint) -> u32 {
        let (dx, dy) = point.to_absolute();
        self.submit(InputRecord::Mouse(MouseInput {
            dx,
            dy,
            mouse_data: 0,
            flags: MouseFlags::MOVE | MouseFlags::ABSOLUTE | MouseFlags::VIRTUAL_DESK,
            extra_info: self.backend.message_extra_info(),
        }))
    }

    pub fn send_mouse_wheel(&self, raw_delta_y: f64) -> u32 {
        self.submit(InputRecord::Mouse(MouseInput {
            dx: 0,
            dy: 0,
            mouse_data: wheel_notch(raw_delta_y),
            flags: MouseFlags::WHEEL,
            extra_info: self.backend.message_extra_info(),
        }))
    }

    pub fn send_key_down(&self, virtual_key: u16) -> u32 {
        self.send_key(KeyEvent {
            virtual_key,
            direction: Direction::Down,
        })
    }

    pub fn send_key_up(&self, virtual_key: u16) -> u32 {
        self.send_key(KeyEvent {
            virtual_key,
            direction: Direction::Up,
        })
    }

    pub fn send_key(&self, event: KeyEvent) -> u32 {
        let flags = match event.direction {
            Direction::Down => KeyFlags::NONE,
            Direction::Up => KeyFlags::KEY_UP,
        };
        self.submit(InputRecord::Keyboard(KeyboardInput {
            virtual_key: event.virtual_key,
            flags,
            extra_info: self.backend.message_extra_info(),
        }))
    }

    fn button(&self, flags: MouseFlags, x: i32, y: i32) -> u32 {
        self.submit(InputRecord::Mouse(MouseInput {
            dx: x,
            dy: y,
            mouse_data: 0,
            flags,
            extra_info: self.backend.message_extra_info(),
        }))
    }

    fn submit(&self, record: InputRecord) -> u32 {
        let accepted = self.backend.send(std::slice::from_ref(&record));
        if accepted < 1 {
            // Partial injection is not fatal; the next event may go through.
            warn!(submitted = 1, accepted, record = ?record, "Input injection partially rejected");
        }
        accepted
    }
}

// ── Windows backend ──────────────────────────────────────────
#[cfg(windows)]
pub struct SendInputBackend;

#[cfg(windows)]
impl InputBackend for SendInputBackend {
    fn send(&self, records: &[InputRecord]) -> u32 {
        use windows::Win32::UI::Input::KeyboardAndMouse::*;

        let inputs: Vec<INPUT> = records
            .iter()
            .map(|record| match record {
                InputRecord::Mouse(m) => INPUT {
                    r#type: INPUT_MOUSE,
                    Anonymous: INPUT_0 {
                        mi: MOUSEINPUT {
                            dx: m.dx,
                            dy: m.dy,
                            mouseData: m.mouse_data as _,
                            dwFlags: MOUSE_EVENT_FLAGS(m.flags.0),
                            time: 0,
                            dwExtraInfo: m.extra_info,
                        },
                    },
                },
                InputRecord::Keyboard(k) => INPUT {
                    r#type: INPUT_KEYBOARD,
                    Anonymous: INPUT_0 {
                        ki: KEYBDINPUT {
                            wVk: VIRTUAL_KEY(k.virtual_key),
                            wScan: 0,
                            dwFlags: KEYBD_EVENT_FLAGS(k.flags.0),
                            time: 0,
                            dwExtraInfo: k.extra_info,
                        },
                    },
                },
            })
            .collect();

        // SAFETY: `inputs` is a valid slice of INPUT for the duration of the call.
        unsafe { SendInput(&inputs, std::mem::size_of::<INPUT>() as i32) }
    }

    fn message_extra_info(&self) -> usize {
        use windows::Win32::UI::WindowsAndMessaging::GetMessageExtraInfo;
        // SAFETY: reads thread message state only.
        unsafe { GetMessageExtraInfo() }.0 as usize
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::cell::{Cell, RefCell};

    /// Records submitted batches; accepts at most `accept` events per call.
    pub struct RecordingBackend {
        pub batches: RefCell<Vec<Vec<InputRecord>>>,
        pub accept: Cell<u32>,
    }

    impl Default for RecordingBackend {
        fn default() -> Self {
            Self {
                batches: RefCell::new(Vec::new()),
                accept: Cell::new(u32::MAX),
            }
        }
    }

    impl RecordingBackend {
        pub fn records(&self) -> Vec<InputRecord> {
            self.batches.borrow().iter().flatten().copied().collect()
        }
    }

    impl InputBackend for &RecordingBackend {
        fn send(&self, records: &[InputRecord]) -> u32 {
            self.batches.borrow_mut().push(records.to_vec());
            (records.len() as u32).min(self.accept.get())
        }

        fn message_extra_info(&self) -> usize {
            0xFF51_5700
        }
    }
}
