use crate::error::AppError;
use crate::forecast::{run_forecast, AugursSelector};
use crate::loader;
use crate::model::{
    AggregatedSeries, Dataset, ExogenousTable, ForecastConfig, ForecastOutcome, TrendSpec,
};
use crate::series;
use eframe::egui;
use egui::{Color32, Context, FontFamily, FontId, Margin, RichText, Stroke, Vec2, Visuals};
use egui_extras::{Column, TableBuilder};
use egui_plot::{Legend, Line, Plot, PlotPoints, Polygon};
use serde::{Deserialize, Serialize};
use tracing::error;

const SETTINGS_FILE: &str = "forecaster_settings.json";

pub fn set_custom_style(ctx: &Context) {
    // Dark pasture-green theme
    let mut visuals = Visuals::dark();

    visuals.panel_fill = Color32::from_rgb(14, 20, 14);
    visuals.window_fill = Color32::from_rgb(20, 28, 20);
    visuals.extreme_bg_color = Color32::from_rgb(28, 40, 28);
    visuals.faint_bg_color = Color32::from_rgb(24, 34, 24);

    visuals.widgets.inactive.bg_fill = Color32::from_rgb(32, 45, 32);
    visuals.widgets.inactive.bg_stroke = Stroke::new(1.0, Color32::from_rgb(55, 80, 55));

    visuals.widgets.hovered.bg_fill = Color32::from_rgb(45, 65, 45);
    visuals.widgets.hovered.bg_stroke = Stroke::new(2.0, Color32::from_rgb(120, 190, 120));

    visuals.widgets.active.bg_fill = Color32::from_rgb(55, 80, 55);
    visuals.widgets.active.bg_stroke = Stroke::new(2.0, Color32::from_rgb(160, 230, 160));

    visuals.selection.bg_fill = Color32::from_rgb(50, 75, 50);
    visuals.selection.stroke = Stroke::new(1.0, Color32::from_rgb(170, 235, 170));

    ctx.set_visuals(visuals);

    let mut style = (*ctx.style()).clone();

    style.spacing.item_spacing = egui::vec2(8.0, 6.0);
    style.spacing.window_margin = Margin::same(12);
    style.spacing.button_padding = egui::vec2(12.0, 8.0);
    style.spacing.indent = 16.0;

    style.text_styles.insert(
        egui::TextStyle::Body,
        FontId::new(15.0, FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Heading,
        FontId::new(22.0, FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Button,
        FontId::new(15.0, FontFamily::Proportional),
    );
    style.text_styles.insert(
        egui::TextStyle::Monospace,
        FontId::new(14.0, FontFamily::Monospace),
    );

    ctx.set_style(style);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DashboardSettings {
    data_path: String,
    seasonal: bool,
    trend: TrendSpec,
    horizon: usize,
    /// Trailing periods to fit on; 0 = full series.
    sample_window: usize,
    /// Observed periods shown on the chart.
    display_window: usize,
    alt_level: f64,
    use_exogenous: bool,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self {
            data_path: "precios_reses.csv".into(),
            seasonal: false,
            trend: TrendSpec::None,
            horizon: 10,
            sample_window: 0,
            display_window: 10,
            alt_level: 0.80,
            use_exogenous: false,
        }
    }
}

struct StatusLine {
    message: String,
    is_error: bool,
}

pub struct ForecasterApp {
    settings: DashboardSettings,
    dataset: Option<Dataset>,
    selected_category: Option<String>,
    series: Option<AggregatedSeries>,
    exogenous: Option<ExogenousTable>,
    outcome: Option<ForecastOutcome>,
    status: Option<StatusLine>,
    selector: AugursSelector,
}

impl ForecasterApp {
    pub fn new() -> Self {
        Self {
            settings: Self::load_settings(),
            dataset: None,
            selected_category: None,
            series: None,
            exogenous: None,
            outcome: None,
            status: None,
            selector: AugursSelector,
        }
    }

    fn load_settings() -> DashboardSettings {
        use std::fs;
        if let Ok(data) = fs::read_to_string(SETTINGS_FILE) {
            serde_json::from_str(&data).unwrap_or_default()
        } else {
            DashboardSettings::default()
        }
    }

    fn save_settings(&self) {
        use std::fs;
        if let Ok(json) = serde_json::to_string(&self.settings) {
            let _ = fs::write(SETTINGS_FILE, json);
        }
    }

    fn ok(&mut self, message: impl Into<String>) {
        self.status = Some(StatusLine {
            message: message.into(),
            is_error: false,
        });
    }

    fn fail(&mut self, err: AppError) {
        error!(%err, "operation failed");
        self.status = Some(StatusLine {
            message: err.to_string(),
            is_error: true,
        });
    }

    fn load_data(&mut self) {
        self.outcome = None;
        match loader::load_dataset(&self.settings.data_path) {
            Ok(dataset) => {
                self.selected_category = dataset.categories.first().cloned();
                let count = dataset.records.len();
                self.dataset = Some(dataset);
                self.rebuild_series();
                if self.series.is_some() {
                    self.ok(format!("Loaded {count} purchase rows"));
                }
            }
            Err(err) => {
                self.dataset = None;
                self.series = None;
                self.fail(err);
            }
        }
        self.save_settings();
    }

    /// Re-aggregate for the selected category. Called after load and whenever
    /// the category selection changes; the previous forecast is discarded.
    fn rebuild_series(&mut self) {
        self.outcome = None;
        self.series = None;
        self.exogenous = None;

        let Some(dataset) = &self.dataset else { return };
        let filtered: Vec<_> = match &self.selected_category {
            Some(cat) => dataset
                .records
                .iter()
                .filter(|r| r.category.as_deref() == Some(cat))
                .cloned()
                .collect(),
            None => dataset.records.clone(),
        };

        match series::aggregate(&filtered) {
            Ok(aggregated) => {
                self.exogenous = Some(series::regressor_table(
                    &filtered,
                    &dataset.regressor_names,
                ));
                // Keep the sliders inside the new series bounds.
                let len = aggregated.len();
                self.settings.horizon = self.settings.horizon.clamp(1, len.max(1));
                self.settings.display_window = self.settings.display_window.clamp(1, len);
                self.settings.sample_window = self.settings.sample_window.min(len);
                self.series = Some(aggregated);
            }
            Err(err) => self.fail(err),
        }
    }

    fn run_forecast_now(&mut self) {
        let Some(series) = &self.series else { return };

        let config = ForecastConfig {
            seasonal: self.settings.seasonal,
            trend: self.settings.trend,
            sample_window: match self.settings.sample_window {
                0 => None,
                n => Some(n),
            },
            horizon: self.settings.horizon,
            alt_level: self.settings.alt_level,
        };
        let exogenous = if self.settings.use_exogenous {
            self.exogenous.as_ref()
        } else {
            None
        };

        match run_forecast(series, exogenous, &config, &self.selector) {
            Ok(outcome) => {
                self.ok(format!("Forecast ready: {} periods", outcome.rows.len()));
                self.outcome = Some(outcome);
            }
            Err(err) => self.fail(err),
        }
        self.save_settings();
    }

    fn side_panel(&mut self, ctx: &Context) {
        let Some(series) = &self.series else { return };
        let series_len = series.len();
        let has_regressors = self
            .dataset
            .as_ref()
            .map(|d| !d.regressor_names.is_empty())
            .unwrap_or(false);
        let mut category_changed = false;

        egui::SidePanel::right("parameters")
            .min_width(260.0)
            .max_width(340.0)
            .show(ctx, |ui| {
                ui.heading(RichText::new("Parámetros").color(Color32::from_rgb(170, 235, 170)));
                ui.separator();

                egui::ScrollArea::vertical().show(ui, |ui| {
                    if let Some(dataset) = &self.dataset {
                        if !dataset.categories.is_empty() {
                            ui.label(RichText::new("Categoría").strong());
                            let current = self
                                .selected_category
                                .clone()
                                .unwrap_or_else(|| "-".into());
                            egui::ComboBox::from_id_salt("category")
                                .selected_text(current)
                                .show_ui(ui, |ui| {
                                    for cat in &dataset.categories {
                                        let selected =
                                            self.selected_category.as_deref() == Some(cat);
                                        if ui.selectable_label(selected, cat).clicked() {
                                            self.selected_category = Some(cat.clone());
                                            category_changed = true;
                                        }
                                    }
                                });
                            ui.add_space(10.0);
                            ui.separator();
                        }
                    }

                    ui.label(RichText::new("Periodos a pronosticar").strong());
                    ui.add(egui::Slider::new(
                        &mut self.settings.horizon,
                        1..=series_len.max(1),
                    ));

                    ui.add_space(10.0);
                    ui.label(RichText::new("Periodos a mostrar").strong());
                    ui.add(egui::Slider::new(
                        &mut self.settings.display_window,
                        5.min(series_len)..=series_len,
                    ));

                    ui.add_space(10.0);
                    ui.label(RichText::new("Muestra (últimos N periodos)").strong());
                    ui.add(
                        egui::Slider::new(&mut self.settings.sample_window, 0..=series_len)
                            .custom_formatter(|v, _| {
                                if v as usize == 0 {
                                    "toda la serie".to_string()
                                } else {
                                    format!("{}", v as usize)
                                }
                            }),
                    );

                    ui.add_space(10.0);
                    ui.separator();

                    ui.checkbox(&mut self.settings.seasonal, "Estacionalidad");

                    ui.add_space(6.0);
                    ui.label(RichText::new("Tendencia").strong());
                    egui::ComboBox::from_id_salt("trend")
                        .selected_text(self.settings.trend.label())
                        .show_ui(ui, |ui| {
                            for trend in TrendSpec::ALL {
                                ui.selectable_value(
                                    &mut self.settings.trend,
                                    trend,
                                    trend.label(),
                                );
                            }
                        });

                    ui.add_space(10.0);
                    ui.label(RichText::new("Nivel de confianza secundario").strong());
                    ui.add(
                        egui::Slider::new(&mut self.settings.alt_level, 0.50..=0.99)
                            .step_by(0.01)
                            .custom_formatter(|v, _| format!("{:.0}%", v * 100.0)),
                    );

                    ui.add_space(10.0);
                    ui.add_enabled(
                        has_regressors,
                        egui::Checkbox::new(
                            &mut self.settings.use_exogenous,
                            "Usar regresores exógenos",
                        ),
                    );
                    if has_regressors {
                        if let Some(dataset) = &self.dataset {
                            ui.label(
                                RichText::new(dataset.regressor_names.join(", "))
                                    .small()
                                    .color(Color32::from_rgb(150, 170, 150)),
                            );
                        }
                    }

                    ui.add_space(14.0);
                    ui.separator();

                    if ui
                        .add_sized(
                            Vec2::new(180.0, 34.0),
                            egui::Button::new(
                                RichText::new("📈 Pronosticar")
                                    .color(Color32::from_rgb(190, 255, 190))
                                    .strong(),
                            ),
                        )
                        .clicked()
                    {
                        self.run_forecast_now();
                    }
                });
            });

        if category_changed {
            self.rebuild_series();
        }
    }

    fn chart(&self, ui: &mut egui::Ui, series: &AggregatedSeries, outcome: &ForecastOutcome) {
        let shown = series.tail(self.settings.display_window);
        let history: Vec<[f64; 2]> = shown
            .points()
            .iter()
            .enumerate()
            .map(|(i, (_, v))| [i as f64, *v])
            .collect();

        // Forecast picks up at the last observed point so the lines join.
        let origin_x = (shown.len().max(1) - 1) as f64;
        let origin_y = shown.points().last().map(|(_, v)| *v);

        let mut forecast_line = Vec::with_capacity(outcome.rows.len() + 1);
        if let Some(y) = origin_y {
            forecast_line.push([origin_x, y]);
        }
        let mut band_95 = Vec::new();
        let mut band_alt = Vec::new();
        for (i, row) in outcome.rows.iter().enumerate() {
            let x = origin_x + (i + 1) as f64;
            forecast_line.push([x, row.point]);
            band_95.push((x, row.band_95));
            band_alt.push((x, row.band_alt));
        }

        let polygon = |band: &[(f64, crate::model::Band)]| -> Vec<[f64; 2]> {
            let mut pts: Vec<[f64; 2]> = band.iter().map(|(x, b)| [*x, b.high]).collect();
            pts.extend(band.iter().rev().map(|(x, b)| [*x, b.low]));
            pts
        };

        let alt_name = format!("Banda {:.0}%", outcome.alt_level * 100.0);
        Plot::new("forecast_plot")
            .legend(Legend::default())
            .height(340.0)
            .show(ui, |plot_ui| {
                plot_ui.polygon(
                    Polygon::new("Banda 95%", PlotPoints::from(polygon(&band_95)))
                        .fill_color(Color32::from_rgba_unmultiplied(120, 190, 120, 40))
                        .stroke(Stroke::NONE),
                );
                plot_ui.polygon(
                    Polygon::new(alt_name, PlotPoints::from(polygon(&band_alt)))
                        .fill_color(Color32::from_rgba_unmultiplied(120, 190, 120, 80))
                        .stroke(Stroke::NONE),
                );
                plot_ui.line(
                    Line::new("Datos reales", PlotPoints::from(history))
                        .color(Color32::from_rgb(130, 180, 255))
                        .width(2.0),
                );
                plot_ui.line(
                    Line::new("Pronóstico", PlotPoints::from(forecast_line))
                        .color(Color32::from_rgb(255, 150, 120))
                        .width(2.0),
                );
            });
    }

    fn results_table(&self, ui: &mut egui::Ui, outcome: &ForecastOutcome) {
        let header_color = Color32::from_rgb(170, 200, 170);
        let alt_pct = format!("{:.0}%", outcome.alt_level * 100.0);

        TableBuilder::new(ui)
            .striped(true)
            .vscroll(true)
            .cell_layout(egui::Layout::left_to_right(egui::Align::Center))
            .column(Column::exact(110.0)) // Periodo
            .column(Column::exact(110.0)) // Pronóstico
            .column(Column::remainder()) // Banda superior 95
            .column(Column::remainder()) // Banda inferior 95
            .column(Column::remainder()) // Banda superior alt
            .column(Column::remainder()) // Banda inferior alt
            .header(30.0, |mut header| {
                header.col(|ui| {
                    ui.heading(RichText::new("Periodo").color(header_color).size(15.0));
                });
                header.col(|ui| {
                    ui.heading(RichText::new("Pronóstico").color(header_color).size(15.0));
                });
                header.col(|ui| {
                    ui.heading(
                        RichText::new("Banda superior de confianza 95%")
                            .color(header_color)
                            .size(15.0),
                    );
                });
                header.col(|ui| {
                    ui.heading(
                        RichText::new("Banda inferior de confianza 95%")
                            .color(header_color)
                            .size(15.0),
                    );
                });
                header.col(|ui| {
                    ui.heading(
                        RichText::new(format!("Banda superior de confianza {alt_pct}"))
                            .color(header_color)
                            .size(15.0),
                    );
                });
                header.col(|ui| {
                    ui.heading(
                        RichText::new(format!("Banda inferior de confianza {alt_pct}"))
                            .color(header_color)
                            .size(15.0),
                    );
                });
            })
            .body(|body| {
                body.rows(26.0, outcome.rows.len(), |mut row| {
                    let r = &outcome.rows[row.index()];
                    row.col(|ui| {
                        ui.label(RichText::new(r.period.label()).monospace());
                    });
                    row.col(|ui| {
                        ui.label(
                            RichText::new(format!("{:.2}", r.point))
                                .color(Color32::from_rgb(255, 180, 150))
                                .strong(),
                        );
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2}", r.band_95.high));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2}", r.band_95.low));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2}", r.band_alt.high));
                    });
                    row.col(|ui| {
                        ui.label(format!("{:.2}", r.band_alt.low));
                    });
                });
            });
    }
}

impl eframe::App for ForecasterApp {
    fn update(&mut self, ctx: &Context, _frame: &mut eframe::Frame) {
        egui::TopBottomPanel::top("top").show(ctx, |ui| {
            ui.add_space(4.0);
            ui.horizontal(|ui| {
                ui.heading(
                    RichText::new("🐄 Pronóstico de Precio de Reses")
                        .color(Color32::from_rgb(170, 235, 170))
                        .strong()
                        .size(24.0),
                );
            });

            ui.add_space(4.0);
            ui.separator();
            ui.add_space(4.0);

            ui.horizontal(|ui| {
                ui.label(RichText::new("Archivo CSV:").color(Color32::from_rgb(150, 190, 150)));
                ui.add(
                    egui::TextEdit::singleline(&mut self.settings.data_path)
                        .desired_width(320.0),
                );
                if ui
                    .add_sized(
                        Vec2::new(110.0, 30.0),
                        egui::Button::new(
                            RichText::new("📂 Cargar")
                                .color(Color32::from_rgb(190, 255, 190))
                                .strong(),
                        ),
                    )
                    .clicked()
                {
                    self.load_data();
                }

                ui.separator();
                ui.label(
                    RichText::new("Columnas requeridas: Año, Semana, Cantidad_Reses, Precio_Planta")
                        .small()
                        .color(Color32::from_rgb(140, 160, 140)),
                );
            });

            if let Some(status) = &self.status {
                let color = if status.is_error {
                    Color32::from_rgb(255, 120, 120)
                } else {
                    Color32::from_rgb(150, 230, 150)
                };
                ui.label(RichText::new(&status.message).color(color));
            }
            ui.add_space(2.0);
        });

        self.side_panel(ctx);

        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(series) = self.series.clone() else {
                ui.centered_and_justified(|ui| {
                    ui.vertical_centered(|ui| {
                        ui.add_space(100.0);
                        ui.label(
                            RichText::new("🐄")
                                .size(80.0)
                                .color(Color32::from_rgb(170, 235, 170)),
                        );
                        ui.add_space(20.0);
                        ui.label(
                            RichText::new("Pronóstico de precio de reses")
                                .size(24.0)
                                .color(Color32::from_rgb(180, 210, 180)),
                        );
                        ui.add_space(10.0);
                        ui.label(
                            RichText::new(
                                "Cargue un archivo CSV con las compras semanales para comenzar",
                            )
                            .color(Color32::from_rgb(150, 180, 150)),
                        );
                    });
                });
                return;
            };

            ui.label(
                RichText::new(format!("Serie agregada: {} periodos semanales", series.len()))
                    .color(Color32::from_rgb(170, 200, 170)),
            );

            let Some(outcome) = self.outcome.clone() else {
                ui.add_space(20.0);
                ui.label(
                    RichText::new("Ajuste los parámetros y pulse Pronosticar")
                        .color(Color32::from_rgb(150, 180, 150)),
                );
                return;
            };

            self.chart(ui, &series, &outcome);

            for warning in &outcome.warnings {
                ui.label(
                    RichText::new(format!("⚠ {warning}"))
                        .color(Color32::from_rgb(255, 210, 120)),
                );
            }

            ui.add_space(8.0);
            self.results_table(ui, &outcome);

            ui.add_space(10.0);
            egui::Frame::new()
                .fill(Color32::from_rgb(24, 34, 24))
                .stroke(Stroke::new(2.0, Color32::from_rgb(55, 80, 55)))
                .inner_margin(Margin::same(12))
                .show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label(
                            RichText::new("Modelo seleccionado:")
                                .color(Color32::from_rgb(170, 235, 170))
                                .strong(),
                        );
                        ui.label(
                            RichText::new(&outcome.model_summary)
                                .color(Color32::from_rgb(200, 220, 200))
                                .italics(),
                        );
                    });
                });
        });
    }
}
