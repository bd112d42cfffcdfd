use anyhow::Result;
use orlando_formats::{FlxAnimation, Rect, Surface};
use serde::Serialize;

use super::walk::{Direction, Point};

/// Either a still bitmap or an FLX animation showing its current frame.
#[derive(Debug)]
pub enum Graphic {
    Still(Surface),
    Animated(Box<FlxAnimation>),
}

impl Graphic {
    pub fn surface(&self) -> &Surface {
        match self {
            Graphic::Still(surface) => surface,
            Graphic::Animated(flx) => flx.surface(),
        }
    }

    pub fn width(&self) -> i32 {
        self.surface().width() as i32
    }

    pub fn height(&self) -> i32 {
        self.surface().height() as i32
    }

    /// Advance an animated graphic by one frame; stills never change.
    pub fn advance(&mut self) -> Result<()> {
        if let Graphic::Animated(flx) = self {
            flx.next_frame()?;
        }
        Ok(())
    }

    pub fn rewind(&mut self) -> Result<()> {
        if let Graphic::Animated(flx) = self {
            flx.rewind();
            flx.next_frame()?;
        }
        Ok(())
    }
}

/// Clip region plus the surface shown inside it.
#[derive(Debug, Clone)]
pub struct Window {
    rect: Rect,
    surface: Surface,
}

impl Window {
    pub fn new(x: i32, y: i32, surface: Surface) -> Self {
        let rect = Rect::from_size(x, y, surface.width() as i32, surface.height() as i32);
        Self { rect, surface }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn position(&self) -> Point {
        Point::new(self.rect.left, self.rect.top)
    }

    pub fn move_to(&mut self, x: i32, y: i32) {
        self.rect = self.rect.translate(x - self.rect.left, y - self.rect.top);
    }

    pub fn surface(&self) -> &Surface {
        &self.surface
    }

    pub fn set_surface(&mut self, surface: &Surface) {
        self.rect = Rect::from_size(
            self.rect.left,
            self.rect.top,
            surface.width() as i32,
            surface.height() as i32,
        );
        self.surface.clone_from(surface);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayMode {
    Loop,
    Once,
}

/// A running FLX animation attached to an entity.
#[derive(Debug)]
pub struct Animation {
    pub name: String,
    /// Id of the entity playing it.
    pub owner: String,
    flx: Box<FlxAnimation>,
    mode: PlayMode,
    finished: bool,
}

impl Animation {
    pub fn new(name: &str, owner: &str, flx: FlxAnimation, mode: PlayMode) -> Self {
        Self {
            name: name.to_string(),
            owner: owner.to_string(),
            flx: Box::new(flx),
            mode,
            finished: false,
        }
    }

    pub fn mode(&self) -> PlayMode {
        self.mode
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn surface(&self) -> &Surface {
        self.flx.surface()
    }

    pub fn frames_read(&self) -> u64 {
        self.flx.frames_read()
    }

    pub fn advance(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        self.flx.next_frame()?;
        if self.mode == PlayMode::Once && self.flx.cycle_complete() {
            self.finished = true;
        }
        Ok(())
    }

    /// Restart and show frame `frame` (0-based), wrapping past the last frame.
    pub fn seek(&mut self, frame: u32) -> Result<()> {
        self.flx.rewind();
        self.finished = false;
        let target = match self.flx.frames_per_pass() {
            0 => u64::from(frame),
            pass => u64::from(frame) % pass,
        };
        for _ in 0..=target {
            self.flx.next_frame()?;
        }
        Ok(())
    }
}

/// Element motion started by `MOVETO`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Motion {
    pub target: Point,
    pub speed: i32,
}

#[derive(Debug)]
pub struct Element {
    pub id: String,
    pub visible: bool,
    pub flip: bool,
    pub window: Window,
    base: Surface,
    pub animation: Option<Animation>,
    pub motion: Option<Motion>,
}

impl Element {
    pub fn new(id: &str, x: i32, y: i32, graphic: Graphic) -> Self {
        let (base, animation) = match graphic {
            Graphic::Still(surface) => (surface, None),
            Graphic::Animated(flx) => {
                let surface = flx.surface().clone();
                (surface, Some(Animation::new(id, id, *flx, PlayMode::Loop)))
            }
        };
        Self {
            id: id.to_string(),
            visible: true,
            flip: false,
            window: Window::new(x, y, base.clone()),
            base,
            animation,
            motion: None,
        }
    }

    pub fn position(&self) -> Point {
        self.window.position()
    }

    pub fn set_bitmap(&mut self, surface: Surface) {
        self.animation = None;
        self.window.set_surface(&surface);
        self.base = surface;
    }

    pub fn play(&mut self, animation: Animation) {
        self.window.set_surface(animation.surface());
        self.animation = Some(animation);
    }

    pub fn stop_animation(&mut self) {
        self.animation = None;
        self.window.set_surface(&self.base);
    }

    pub fn is_moving(&self) -> bool {
        self.motion.is_some()
    }

    /// Whether the current animation is done (or there is none).
    pub fn animation_done(&self) -> bool {
        self.animation
            .as_ref()
            .map_or(true, |animation| animation.is_finished())
    }

    pub fn sync_window(&mut self) {
        if let Some(animation) = self.animation.as_ref() {
            self.window.set_surface(animation.surface());
        }
    }

    /// Anchor point persons walk to: bottom centre of the window.
    pub fn foot_point(&self) -> Point {
        let rect = self.window.rect();
        Point::new(rect.left + rect.width() / 2, rect.bottom)
    }
}

/// Text a person is currently saying.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Speech {
    pub text: String,
    pub frames_left: u32,
}

#[derive(Debug)]
pub struct Person {
    pub id: String,
    /// Feet position.
    pub position: Point,
    pub speed: i32,
    pub visible: bool,
    pub direction: Direction,
    /// One graphic per facing, in [`Direction`] order.
    pub graphics: [Option<Graphic>; 8],
    pub walk_target: Option<Point>,
    pub animation: Option<Animation>,
    pub speech: Option<Speech>,
    pub follow: Option<String>,
}

impl Person {
    pub fn new(id: &str, position: Point, speed: i32, graphics: [Option<Graphic>; 8]) -> Self {
        Self {
            id: id.to_string(),
            position,
            speed: speed.max(1),
            visible: true,
            direction: Direction::default(),
            graphics,
            walk_target: None,
            animation: None,
            speech: None,
            follow: None,
        }
    }

    pub fn is_walking(&self) -> bool {
        self.walk_target.is_some()
    }

    pub fn is_talking(&self) -> bool {
        self.speech.is_some()
    }

    /// The surface to draw this frame, if any.
    pub fn current_surface(&self) -> Option<&Surface> {
        if let Some(animation) = self.animation.as_ref() {
            return Some(animation.surface());
        }
        self.graphics[self.direction.index()]
            .as_ref()
            .or_else(|| self.graphics.iter().flatten().next())
            .map(Graphic::surface)
    }

    /// Screen-space bounds with the feet at the bottom centre.
    pub fn bounds(&self) -> Option<Rect> {
        let surface = self.current_surface()?;
        let (w, h) = (surface.width() as i32, surface.height() as i32);
        Some(Rect::from_size(
            self.position.x - w / 2,
            self.position.y - h,
            w,
            h,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Area {
    pub id: String,
    #[serde(skip)]
    pub rect: Rect,
    pub enabled: bool,
    pub macro_id: Option<String>,
}

impl Area {
    pub fn foot_point(&self) -> Point {
        Point::new(self.rect.left + self.rect.width() / 2, self.rect.bottom - 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DialogAnswer {
    pub text: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dialog {
    pub id: String,
    pub answers: Vec<DialogAnswer>,
}

impl Dialog {
    /// Answer `number` (1-based), if it exists.
    pub fn answer_mut(&mut self, number: i32) -> Option<&mut DialogAnswer> {
        let index = usize::try_from(number).ok()?.checked_sub(1)?;
        self.answers.get_mut(index)
    }

    pub fn enabled_answers(&self) -> Vec<String> {
        self.answers
            .iter()
            .filter(|answer| answer.enabled)
            .map(|answer| answer.text.clone())
            .collect()
    }
}

/// Close-up portrait shown while a person talks.
#[derive(Debug)]
pub struct Face {
    pub person: String,
    pub graphic: Graphic,
}

/// Overlay animation drawn above elements (`INSERTION`).
#[derive(Debug)]
pub struct Insertion {
    pub id: String,
    pub resource: String,
    pub position: Point,
    pub animation: Option<Animation>,
}

impl Insertion {
    pub fn is_active(&self) -> bool {
        self.animation
            .as_ref()
            .is_some_and(|animation| !animation.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orlando_formats::flx::{DeltaFrame, FlxBuilder};

    fn two_frame_flx() -> FlxAnimation {
        let bytes = FlxBuilder::new(2, 1)
            .palette(&[0, 0x7C00, 0x03E0])
            .frame(&DeltaFrame::new(0).run(0, &[1, 1]))
            .frame(&DeltaFrame::new(0).run(0, &[2, 2]))
            .build();
        FlxAnimation::open(bytes).unwrap()
    }

    #[test]
    fn one_shot_animation_finishes_after_a_cycle() {
        let mut animation = Animation::new("WAVE", "JACK", two_frame_flx(), PlayMode::Once);
        animation.advance().unwrap();
        assert!(!animation.is_finished());
        animation.advance().unwrap();
        assert!(animation.is_finished());
        animation.advance().unwrap();
        assert_eq!(animation.frames_read(), 2);
    }

    #[test]
    fn one_shot_finishes_when_header_omits_frame_count() {
        let bytes = FlxBuilder::new(2, 1)
            .frame_count(0)
            .palette(&[0, 0x7C00, 0x03E0])
            .frame(&DeltaFrame::new(0).run(0, &[1, 1]))
            .frame(&DeltaFrame::new(0).run(0, &[2, 2]))
            .build();
        let flx = FlxAnimation::open(bytes).unwrap();
        let mut animation = Animation::new("WAVE", "JACK", flx, PlayMode::Once);
        for _ in 0..20 {
            animation.advance().unwrap();
        }
        assert!(animation.is_finished());
        assert_eq!(animation.frames_read(), 2);
    }

    #[test]
    fn seek_wraps_frame_numbers_past_the_pass() {
        let mut animation = Animation::new("WAVE", "JACK", two_frame_flx(), PlayMode::Loop);
        animation.seek(u32::MAX).unwrap();
        assert_eq!(animation.frames_read(), 2);
        assert_eq!(animation.surface().pixels(), &[0x03E0, 0x03E0]);

        animation.seek(4).unwrap();
        assert_eq!(animation.frames_read(), 1);
        assert_eq!(animation.surface().pixels(), &[0x7C00, 0x7C00]);
    }

    #[test]
    fn element_restores_its_bitmap_when_animation_stops() {
        let still = Surface::from_pixels(1, 1, vec![0x1234]).unwrap();
        let mut element = Element::new("DOOR", 5, 6, Graphic::Still(still.clone()));
        assert!(element.animation_done());

        let mut animation = Animation::new("OPEN", "DOOR", two_frame_flx(), PlayMode::Loop);
        animation.advance().unwrap();
        element.play(animation);
        assert_eq!(element.window.rect(), Rect::from_size(5, 6, 2, 1));
        assert!(!element.animation_done());

        element.stop_animation();
        assert_eq!(element.window.surface(), &still);
        assert_eq!(element.position(), Point::new(5, 6));
    }

    #[test]
    fn dialog_answers_are_one_based() {
        let mut dialog = Dialog {
            id: "D1".into(),
            answers: vec![
                DialogAnswer {
                    text: "yes".into(),
                    enabled: true,
                },
                DialogAnswer {
                    text: "no".into(),
                    enabled: true,
                },
            ],
        };
        dialog.answer_mut(2).unwrap().enabled = false;
        assert!(dialog.answer_mut(0).is_none());
        assert!(dialog.answer_mut(3).is_none());
        assert_eq!(dialog.enabled_answers(), vec!["yes".to_string()]);
    }

    #[test]
    fn person_bounds_stand_on_the_feet() {
        let surface = Surface::new(4, 10);
        let mut graphics: [Option<Graphic>; 8] = Default::default();
        graphics[Direction::East.index()] = Some(Graphic::Still(surface));
        let person = Person::new("JACK", Point::new(50, 100), 2, graphics);
        assert_eq!(person.bounds(), Some(Rect::from_size(48, 90, 4, 10)));
    }
}
