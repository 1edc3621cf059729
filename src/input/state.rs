use crossterm::event::KeyCode;

#[derive(Debug, Default)]
pub struct InputState {
    pub quit_requested: bool,
}

/// Everything a key press can ask for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    Quit,
    ToggleHud,
    TogglePause,
    ToggleFace,
    Speed(f32),
    Density(f32),
    Trail(f32),
    Persistence(f32),
    Hue(f32),
    FontSize(f32),
    Glow(f32),
    DepthInfluence(f32),
    NextSource,
    ResetSource,
    Speak,
    StopSpeech,
    Snapshot,
}

/// Map a key to its action. Lower case lowers a value, upper case raises it.
pub fn action_for_key(code: KeyCode) -> Option<Action> {
    let action = match code {
        KeyCode::Esc => Action::Quit,
        KeyCode::Tab => Action::ToggleHud,
        KeyCode::Char(c) => match c {
            'q' | 'Q' => Action::Quit,
            ' ' => Action::TogglePause,
            'v' | 'V' => Action::ToggleFace,
            '+' | '=' => Action::Speed(1.2),
            '-' | '_' => Action::Speed(1.0 / 1.2),
            'd' => Action::Density(-0.1),
            'D' => Action::Density(0.1),
            't' => Action::Trail(-0.1),
            'T' => Action::Trail(0.1),
            'o' => Action::Persistence(-0.05),
            'O' => Action::Persistence(0.05),
            'h' => Action::Hue(-15.0),
            'H' => Action::Hue(15.0),
            'f' => Action::FontSize(-1.0),
            'F' => Action::FontSize(1.0),
            'g' => Action::Glow(-0.1),
            'G' => Action::Glow(0.1),
            'i' => Action::DepthInfluence(-0.1),
            'I' => Action::DepthInfluence(0.1),
            'n' | 'N' => Action::NextSource,
            'r' | 'R' => Action::ResetSource,
            's' | 'S' => Action::Speak,
            'x' | 'X' => Action::StopSpeech,
            'c' | 'C' => Action::Snapshot,
            _ => return None,
        },
        _ => return None,
    };
    Some(action)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn case_picks_direction() {
        assert_eq!(action_for_key(KeyCode::Char('d')), Some(Action::Density(-0.1)));
        assert_eq!(action_for_key(KeyCode::Char('D')), Some(Action::Density(0.1)));
        assert_eq!(action_for_key(KeyCode::Char('H')), Some(Action::Hue(15.0)));
        assert_eq!(action_for_key(KeyCode::Esc), Some(Action::Quit));
        assert_eq!(action_for_key(KeyCode::Char('?')), None);
        assert_eq!(action_for_key(KeyCode::Up), None);
    }
}
