use clap::Parser;
use eframe::egui;
use egui_phosphor::regular as icons;
use egui_taffy::{TuiBuilderLogic, taffy, tui};
use midi_pedal::{
    backend::{Direction, MidirBackend},
    config::AppConfig,
    controller::{AppEvent, Controller},
    controls::{Button, Knob},
    devices::Selection,
    midi::MidiNote,
};
use std::path::PathBuf;
use std::time::Instant;
use taffy::prelude::length;

const APP_WIDTH: f32 = 740.0;
const APP_HEIGHT: f32 = 800.0;
const PEDAL_COLOUR: egui::Color32 = egui::Color32::from_rgb(56, 148, 149);

// C2 (MIDI 36) to C7 (MIDI 96) - 5 octaves
const KEYBOARD_LOW: u8 = 36;
const KEYBOARD_HIGH: u8 = 96;

#[derive(Parser)]
#[command(name = "midi-pedal-gui")]
#[command(about = "MIDI pedal controller", long_about = None)]
struct Cli {
    /// Path to a configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

struct PedalApp {
    controller: Controller<MidirBackend>,
    held_note: Option<MidiNote>,
}

impl PedalApp {
    fn new(cc: &eframe::CreationContext<'_>, config: AppConfig) -> Self {
        let mut fonts = egui::FontDefinitions::default();
        egui_phosphor::add_to_fonts(&mut fonts, egui_phosphor::Variant::Regular);
        cc.egui_ctx.set_fonts(fonts);

        let labels_path = config.labels_path.clone();
        let backend = MidirBackend::new(&config.client_name);
        let mut controller = Controller::new(backend, config);

        // repaint as soon as a message arrives instead of waiting for the next tick
        let ctx = cc.egui_ctx.clone();
        controller.set_relay_waker(move || ctx.request_repaint());

        if labels_path.exists() {
            controller.update(AppEvent::LoadLabels(labels_path));
        }

        Self {
            controller,
            held_note: None,
        }
    }

    fn device_list(&self, ui: &mut egui::Ui, direction: Direction, events: &mut Vec<AppEvent>) {
        let directory = self.controller.directory(direction);
        let selected = directory.selection();

        egui::ScrollArea::vertical()
            .id_salt(("devices", direction.to_string()))
            .max_height(96.0)
            .auto_shrink([false, true])
            .show(ui, |ui| {
                if directory.is_empty() {
                    ui.label(
                        egui::RichText::new(format!("No MIDI {}s", direction))
                            .italics()
                            .color(egui::Color32::GRAY),
                    );
                }
                for (i, device) in directory.devices().iter().enumerate() {
                    let is_selected = selected.contains(&i);
                    if ui.selectable_label(is_selected, device.name()).clicked() {
                        // clicking toggles the row, like a multi-select list
                        let mut selection: Selection = selected.clone();
                        if is_selected {
                            selection.remove(&i);
                        } else {
                            selection.insert(i);
                        }
                        events.push(AppEvent::SelectionChanged {
                            direction,
                            selection,
                        });
                    }
                }
            });
    }

    fn draw_pedal(&self, ui: &mut egui::Ui, events: &mut Vec<AppEvent>) {
        let controls = *self.controller.controls();
        let labels = self.controller.labels();

        egui::Frame::new()
            .fill(egui::Color32::BLACK)
            .stroke(egui::Stroke::new(5.0, PEDAL_COLOUR))
            .corner_radius(5.0)
            .inner_margin(egui::Margin::same(12))
            .show(ui, |ui| {
                tui(ui, "knobs_tui")
                    .reserve_available_width()
                    .style(taffy::Style {
                        flex_direction: taffy::FlexDirection::Row,
                        justify_content: Some(taffy::JustifyContent::SpaceBetween),
                        gap: length(8.0),
                        padding: length(8.0),
                        ..Default::default()
                    })
                    .show(|tui| {
                        for knob in Knob::ALL {
                            tui.ui(|ui| {
                                ui.vertical_centered(|ui| {
                                    let mut caption = labels.knob(knob).to_string();
                                    if caption_edit(ui, &mut caption) {
                                        events.push(AppEvent::LabelEdited {
                                            name: knob.label_key().to_string(),
                                            text: caption,
                                        });
                                    }

                                    let mut value = controls.knob(knob);
                                    let slider = egui::Slider::new(&mut value, 0..=127)
                                        .vertical()
                                        .show_value(true);
                                    if ui.add(slider).changed() {
                                        events.push(AppEvent::KnobChanged { knob, value });
                                    }
                                });
                            });
                        }
                    });

                tui(ui, "buttons_tui")
                    .reserve_available_width()
                    .style(taffy::Style {
                        flex_direction: taffy::FlexDirection::Row,
                        justify_content: Some(taffy::JustifyContent::SpaceAround),
                        gap: length(8.0),
                        padding: length(8.0),
                        ..Default::default()
                    })
                    .show(|tui| {
                        for button in Button::ALL {
                            tui.ui(|ui| {
                                ui.vertical_centered(|ui| {
                                    let mut caption = labels.button(button).to_string();
                                    if caption_edit(ui, &mut caption) {
                                        events.push(AppEvent::LabelEdited {
                                            name: button.label_key().to_string(),
                                            text: caption,
                                        });
                                    }

                                    let mut on = controls.button(button);
                                    let fill = if on {
                                        egui::Color32::RED
                                    } else {
                                        egui::Color32::DARK_GRAY
                                    };
                                    let led = egui::Button::new(
                                        egui::RichText::new(icons::CIRCLE).size(28.0).color(fill),
                                    )
                                    .min_size(egui::vec2(100.0, 50.0))
                                    .selected(on);
                                    if ui.add(led).clicked() {
                                        on = !on;
                                        events.push(AppEvent::ButtonToggled { button, on });
                                    }
                                });
                            });
                        }
                    });
            });
    }

    fn draw_keyboard(&mut self, ui: &mut egui::Ui, events: &mut Vec<AppEvent>) {
        let (rect, response) = ui.allocate_exact_size(
            egui::vec2(ui.available_width(), 64.0),
            egui::Sense::click_and_drag(),
        );

        // Track the key under the pointer while the button is held, sliding between keys
        let pointed = if response.is_pointer_button_down_on() {
            response
                .interact_pointer_pos()
                .and_then(|pos| key_at(rect, pos))
        } else {
            None
        };
        if pointed != self.held_note {
            if let Some(note) = self.held_note.take() {
                events.push(AppEvent::KeyReleased(note));
            }
            if let Some(note) = pointed {
                events.push(AppEvent::KeyPressed(note));
            }
            self.held_note = pointed;
        }

        let painter = ui.painter_at(rect);
        let white_notes = white_notes();
        let white_key_width = rect.width() / white_notes.len() as f32;
        let black_key_width = white_key_width * 0.7;
        let black_key_height = rect.height() * 0.6;
        let held = self.held_note.map(|n| n.value());

        // 1. Draw white keys
        for (i, &note) in white_notes.iter().enumerate() {
            let x = rect.min.x + i as f32 * white_key_width;
            let color = if held == Some(note) {
                egui::Color32::from_rgb(120, 200, 200)
            } else {
                egui::Color32::WHITE
            };

            let key_rect = egui::Rect::from_min_size(
                egui::pos2(x, rect.min.y),
                egui::vec2(white_key_width, rect.height()),
            );

            painter.rect(
                key_rect,
                2.0,
                color,
                egui::Stroke::new(1.0, egui::Color32::from_gray(180)),
                egui::epaint::StrokeKind::Inside,
            );
        }

        // 2. Draw black keys
        for (i, &note) in white_notes.iter().enumerate() {
            let note_in_octave = note % 12;
            // If this white note has a black key to its right (except E and B)
            if !matches!(note_in_octave, 4 | 11) && i < white_notes.len() - 1 {
                let black_note = note + 1;
                let x = rect.min.x + (i as f32 + 1.0) * white_key_width - black_key_width / 2.0;

                let color = if held == Some(black_note) {
                    PEDAL_COLOUR
                } else {
                    egui::Color32::from_gray(40)
                };

                let key_rect = egui::Rect::from_min_size(
                    egui::pos2(x, rect.min.y),
                    egui::vec2(black_key_width, black_key_height),
                );

                painter.rect(
                    key_rect,
                    1.0,
                    color,
                    egui::Stroke::new(1.0, egui::Color32::BLACK),
                    egui::epaint::StrokeKind::Inside,
                );
            }
        }
    }
}

fn caption_edit(ui: &mut egui::Ui, caption: &mut String) -> bool {
    ui.add(
        egui::TextEdit::singleline(caption)
            .font(egui::TextStyle::Heading)
            .horizontal_align(egui::Align::Center)
            .desired_width(100.0)
            .frame(false),
    )
    .changed()
}

fn white_notes() -> Vec<u8> {
    (KEYBOARD_LOW..=KEYBOARD_HIGH)
        .filter(|&n| !matches!(n % 12, 1 | 3 | 6 | 8 | 10))
        .collect()
}

/// The key drawn at `pos`; black keys sit on top of white ones
fn key_at(rect: egui::Rect, pos: egui::Pos2) -> Option<MidiNote> {
    if !rect.contains(pos) {
        return None;
    }
    let white_notes = white_notes();
    let white_key_width = rect.width() / white_notes.len() as f32;
    let black_key_width = white_key_width * 0.7;
    let x = pos.x - rect.min.x;
    let i = ((x / white_key_width) as usize).min(white_notes.len() - 1);
    let note = white_notes[i];

    if pos.y - rect.min.y < rect.height() * 0.6 {
        let right_edge = (i as f32 + 1.0) * white_key_width;
        let left_edge = i as f32 * white_key_width;
        if right_edge - x < black_key_width / 2.0
            && !matches!(note % 12, 4 | 11)
            && i < white_notes.len() - 1
        {
            return MidiNote::new(note + 1).ok();
        }
        if x - left_edge < black_key_width / 2.0 && matches!(note % 12, 2 | 4 | 7 | 9 | 11) {
            return MidiNote::new(note - 1).ok();
        }
    }

    MidiNote::new(note).ok()
}

impl eframe::App for PedalApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.controller.tick(Instant::now());

        let mut events = Vec::new();

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(2, |columns| {
                columns[0].label("MIDI Input:");
                self.device_list(&mut columns[0], Direction::Input, &mut events);
                columns[1].label("MIDI Output:");
                self.device_list(&mut columns[1], Direction::Output, &mut events);
            });

            ui.separator();

            ui.horizontal(|ui| {
                let labels_path = self.controller.config().labels_path.clone();
                if ui
                    .button(format!("{} Save labels", icons::FLOPPY_DISK))
                    .clicked()
                {
                    events.push(AppEvent::SaveLabels(labels_path.clone()));
                }
                if ui
                    .button(format!("{} Load labels", icons::FOLDER_OPEN))
                    .clicked()
                {
                    events.push(AppEvent::LoadLabels(labels_path));
                }
                if ui
                    .button(format!("{} Refresh devices", icons::ARROWS_CLOCKWISE))
                    .clicked()
                {
                    events.push(AppEvent::RefreshDevices);
                }
            });

            ui.add_space(8.0);
            self.draw_pedal(ui, &mut events);
            ui.add_space(8.0);

            ui.label("Play the keyboard to send MIDI messages...");
            self.draw_keyboard(ui, &mut events);

            ui.separator();

            ui.horizontal(|ui| {
                ui.label("Received MIDI messages:");
                if ui.button(format!("{} Clear", icons::TRASH)).clicked() {
                    events.push(AppEvent::ClearLog);
                }
            });
            egui::ScrollArea::vertical()
                .id_salt("monitor")
                .stick_to_bottom(true)
                .auto_shrink([false; 2])
                .max_height(ui.available_height() - 24.0)
                .show(ui, |ui| {
                    for line in self.controller.monitor().lines() {
                        ui.monospace(line);
                    }
                });

            // Status bar
            ui.horizontal(|ui| {
                ui.label("Status:");
                ui.colored_label(egui::Color32::GRAY, self.controller.status());
                let dropped = self.controller.dropped_messages();
                if dropped > 0 {
                    ui.colored_label(egui::Color32::YELLOW, format!("{} dropped", dropped));
                }
            });
        });

        for event in events {
            self.controller.update(event);
        }

        ctx.request_repaint_after(self.controller.config().refresh_interval());
    }
}

fn main() -> eframe::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(path) => match AppConfig::from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!("Error loading {}: {}, using defaults", path.display(), e);
                AppConfig::default()
            }
        },
        None => AppConfig::default(),
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([APP_WIDTH, APP_HEIGHT])
            .with_min_inner_size([600.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "MIDI Pedal",
        options,
        Box::new(|cc| Ok(Box::new(PedalApp::new(cc, config)))),
    )
}
