use crate::SimParams;
use winit::{
  event::{ElementState, KeyEvent, WindowEvent},
  keyboard::{KeyCode, PhysicalKey},
};

/// Amount one key press moves a distance.
pub const DISTANCE_STEP: f32 = 1.0;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Knob {
  Separation,
  Alignment,
  Cohesion,
}

/// Keyboard stand-in for the separation/alignment/cohesion sliders.
///
/// `Z`/`X` lower/raise separation, `C`/`V` alignment and `B`/`N` cohesion.
/// Changes apply to the parameter set right away, so the next frame's
/// uniforms carry them.
#[derive(Debug, Default)]
pub struct EffectController;

impl EffectController {
  pub fn key_binding(keycode: KeyCode) -> Option<(Knob, f32)> {
    match keycode {
      KeyCode::KeyZ => Some((Knob::Separation, -DISTANCE_STEP)),
      KeyCode::KeyX => Some((Knob::Separation, DISTANCE_STEP)),
      KeyCode::KeyC => Some((Knob::Alignment, -DISTANCE_STEP)),
      KeyCode::KeyV => Some((Knob::Alignment, DISTANCE_STEP)),
      KeyCode::KeyB => Some((Knob::Cohesion, -DISTANCE_STEP)),
      KeyCode::KeyN => Some((Knob::Cohesion, DISTANCE_STEP)),
      _ => None,
    }
  }

  /// Moves one knob, keeping it within `[0, MAX_DISTANCE]`.
  pub fn adjust(params: &mut SimParams, knob: Knob, amount: f32) {
    let value = match knob {
      Knob::Separation => &mut params.separation,
      Knob::Alignment => &mut params.alignment,
      Knob::Cohesion => &mut params.cohesion,
    };
    *value += amount;
    *params = params.clamped();
  }

  pub fn process_events(&mut self, event: &WindowEvent, params: &mut SimParams) -> bool {
    let WindowEvent::KeyboardInput {
      event:
        KeyEvent {
          state: ElementState::Pressed,
          physical_key: PhysicalKey::Code(keycode),
          ..
        },
      ..
    } = event
    else {
      return false;
    };
    let Some((knob, amount)) = Self::key_binding(*keycode) else {
      return false;
    };
    Self::adjust(params, knob, amount);
    log::info!(
      "separation {:.0}, alignment {:.0}, cohesion {:.0}",
      params.separation,
      params.alignment,
      params.cohesion
    );
    true
  }
}
