// Form Module - The editable controls bound to the settings document
use crate::settings::{
    clamp_beat_cooldown, clamp_sensitivity, CustomColor, SettingsDocument, NO_TARGET_DATA_LINE,
};
use crate::types::{ColorKey, Hsl};

pub const NO_BRIDGE_FOUND_LABEL: &str = "No bridge found in your local network";

#[derive(Debug, Clone, PartialEq)]
pub struct SelectOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl SelectOption {
    fn new(value: &str, selected: bool) -> Self {
        SelectOption { value: value.to_string(), label: value.to_string(), selected }
    }
}

// Generated <select> list with exactly one selected entry
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Select {
    pub options: Vec<SelectOption>,
}

impl Select {
    pub fn value(&self) -> &str {
        self.options
            .iter()
            .find(|o| o.selected)
            .map(|o| o.value.as_str())
            .unwrap_or("")
    }

    pub fn selected_index(&self) -> Option<usize> {
        self.options.iter().position(|o| o.selected)
    }

    pub fn select(&mut self, index: usize) {
        if index >= self.options.len() {
            return;
        }
        for (i, option) in self.options.iter_mut().enumerate() {
            option.selected = i == index;
        }
    }

    /// Moves the selection by `step`, wrapping around
    pub fn cycle(&mut self, step: isize) {
        let len = self.options.len() as isize;
        if len == 0 {
            return;
        }
        let current = self.selected_index().unwrap_or(0) as isize;
        self.select((current + step).rem_euclid(len) as usize);
    }

    fn ensure_selection(&mut self) {
        if self.selected_index().is_none() {
            self.select(0);
        }
    }
}

/// Every control that mirrors a settings field
#[derive(Debug, Clone, PartialEq)]
pub struct SettingsForm {
    pub debug_mode: bool,
    pub open_browser_on_start: bool,
    pub bridge_port: u32,
    pub beat_cooldown: u32,
    pub sensitivity: f64,
    pub bridge: Select,
    // Debug-only text field that overrides the bridge selector when filled
    pub force_bridge_ip_address: String,
    pub target_data_line: Select,
}

impl Default for SettingsForm {
    fn default() -> Self {
        SettingsForm::populate(&SettingsDocument::default())
    }
}

impl SettingsForm {
    pub fn populate(doc: &SettingsDocument) -> Self {
        // Audio input list: "none" first, then everything the server found
        let mut target_data_line = Select::default();
        target_data_line.options.push(SelectOption::new(
            NO_TARGET_DATA_LINE,
            doc.active_target_data_line == NO_TARGET_DATA_LINE,
        ));
        for line in &doc.possible_target_data_lines {
            target_data_line
                .options
                .push(SelectOption::new(line, *line == doc.active_target_data_line));
        }
        target_data_line.ensure_selection();

        let mut bridge = Select::default();
        for ip in &doc.possible_bridge_ip_addresses {
            bridge.options.push(SelectOption::new(ip, *ip == doc.bridge_ip_address));
        }
        if doc.has_bridge() && bridge.selected_index().is_none() {
            // Address set by hand (or no longer discovered): keep it selectable
            bridge.options.push(SelectOption::new(&doc.bridge_ip_address, true));
        }
        if bridge.options.is_empty() {
            bridge.options.push(SelectOption {
                value: String::new(),
                label: NO_BRIDGE_FOUND_LABEL.to_string(),
                selected: true,
            });
        }
        bridge.ensure_selection();

        SettingsForm {
            debug_mode: doc.client_settings.debug_mode,
            open_browser_on_start: doc.open_browser_on_start,
            bridge_port: doc.bridge_port,
            beat_cooldown: doc.beat_cooldown,
            sensitivity: doc.sensitivity,
            bridge,
            force_bridge_ip_address: String::new(),
            target_data_line,
        }
    }

    /// Writes every control back into `doc`
    pub fn read_into(&self, doc: &mut SettingsDocument) {
        doc.active_target_data_line = self.target_data_line.value().to_string();
        doc.open_browser_on_start = self.open_browser_on_start;
        doc.client_settings.debug_mode = self.debug_mode;
        doc.bridge_port = self.bridge_port;
        doc.beat_cooldown = self.beat_cooldown;
        doc.sensitivity = self.sensitivity;

        let forced = self.force_bridge_ip_address.trim();
        doc.bridge_ip_address = if !forced.is_empty() {
            forced.to_string()
        } else {
            self.bridge.value().to_string()
        };
    }

    pub fn set_beat_cooldown(&mut self, value: i64) {
        self.beat_cooldown = clamp_beat_cooldown(value);
    }

    pub fn set_sensitivity(&mut self, value: f64) {
        // Two decimals, like the slider's step
        self.sensitivity = (clamp_sensitivity(value) * 100.0).round() / 100.0;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorButton {
    pub key: ColorKey,
    pub hsl: Hsl,
    pub hex: String,
}

impl From<&CustomColor> for ColorButton {
    fn from(color: &CustomColor) -> Self {
        ColorButton { key: color.key(), hsl: color.hsl, hex: color.hex.clone() }
    }
}

/// Rendered custom-color buttons, in display order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorButtons {
    buttons: Vec<ColorButton>,
}

impl ColorButtons {
    pub fn contains(&self, key: &ColorKey) -> bool {
        self.buttons.iter().any(|b| &b.key == key)
    }

    pub fn push(&mut self, color: &CustomColor) {
        self.buttons.push(ColorButton::from(color));
    }

    pub fn clear(&mut self) {
        self.buttons.clear();
    }

    pub fn show(&mut self, colors: &[CustomColor]) {
        self.buttons.extend(colors.iter().map(ColorButton::from));
    }

    pub fn get(&self, index: usize) -> Option<&ColorButton> {
        self.buttons.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColorButton> {
        self.buttons.iter()
    }

    pub fn len(&self) -> usize {
        self.buttons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buttons.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> SettingsDocument {
        let mut doc = SettingsDocument::default();
        doc.bridge_ip_address = "192.168.1.21".to_string();
        doc.possible_bridge_ip_addresses = vec!["192.168.1.20".to_string(), "192.168.1.21".to_string()];
        doc.possible_target_data_lines = vec!["Line In".to_string(), "Microphone".to_string()];
        doc.active_target_data_line = "Microphone".to_string();
        doc
    }

    #[test]
    fn test_populate_selects_active_values() {
        let form = SettingsForm::populate(&doc());
        assert_eq!(form.bridge.value(), "192.168.1.21");
        assert_eq!(form.bridge.options.len(), 2);
        assert_eq!(form.target_data_line.options[0].value, "none");
        assert_eq!(form.target_data_line.value(), "Microphone");
        assert_eq!(form.target_data_line.options.iter().filter(|o| o.selected).count(), 1);
    }

    #[test]
    fn test_no_bridge_placeholder() {
        let form = SettingsForm::populate(&SettingsDocument::default());
        assert_eq!(form.bridge.options.len(), 1);
        assert_eq!(form.bridge.options[0].label, NO_BRIDGE_FOUND_LABEL);
        assert_eq!(form.bridge.value(), "");
        assert_eq!(form.target_data_line.value(), "none");
    }

    #[test]
    fn test_undiscovered_bridge_stays_selected() {
        let mut d = doc();
        d.bridge_ip_address = "10.1.1.1".to_string();
        let form = SettingsForm::populate(&d);
        assert_eq!(form.bridge.options.len(), 3);
        assert_eq!(form.bridge.value(), "10.1.1.1");
    }

    #[test]
    fn test_unknown_audio_input_falls_back_to_none() {
        let mut d = doc();
        d.active_target_data_line = "Gone".to_string();
        let form = SettingsForm::populate(&d);
        assert_eq!(form.target_data_line.value(), "none");
    }

    #[test]
    fn test_read_into_round_trip() {
        let original = doc();
        let mut copy = original.clone();
        SettingsForm::populate(&original).read_into(&mut copy);
        assert_eq!(copy, original);
    }

    #[test]
    fn test_force_bridge_overrides_selection() {
        let mut form = SettingsForm::populate(&doc());
        form.force_bridge_ip_address = " 10.9.9.9 ".to_string();
        let mut d = doc();
        form.read_into(&mut d);
        assert_eq!(d.bridge_ip_address, "10.9.9.9");
    }

    #[test]
    fn test_cycle_wraps() {
        let mut form = SettingsForm::populate(&doc());
        form.target_data_line.cycle(1);
        assert_eq!(form.target_data_line.value(), "none");
        form.target_data_line.cycle(-1);
        assert_eq!(form.target_data_line.value(), "Microphone");
    }

    #[test]
    fn test_slider_clamps() {
        let mut form = SettingsForm::default();
        form.set_beat_cooldown(2000);
        assert_eq!(form.beat_cooldown, 1000);
        form.set_sensitivity(0.2);
        assert_eq!(form.sensitivity, 0.5);
        form.set_sensitivity(1.234);
        assert_eq!(form.sensitivity, 1.23);
    }

    #[test]
    fn test_color_buttons() {
        let mut buttons = ColorButtons::default();
        let red = CustomColor::from_hsl(Hsl::new(0.0, 100.0, 50.0));
        buttons.push(&red);
        assert!(buttons.contains(&red.key()));
        assert_eq!(buttons.get(0).unwrap().hex, "#ff0000");
        buttons.clear();
        assert!(buttons.is_empty());
    }
}
