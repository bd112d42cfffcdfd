//! Scene resource files, one per entity category.
//!
//! Every file is a text resource split into `[SECTION]` blocks. Only the
//! graphics (`.CCG`) and macro (`.MCC`) files are required; the rest are
//! skipped with a debug line when absent. A malformed entry aborts the load.

use anyhow::Result;
use log::{debug, warn};
use orlando_formats::text::parse_int;
use orlando_formats::{Rect, Surface, TextParser, Token};

use super::entities::{Area, Dialog, DialogAnswer, Element, Face, Graphic, Insertion, Person};
use super::walk::{Point, WalkMap, WalkPolygon};
use super::{SceneLoadError, SceneSettings, World};
use crate::resources::ResourceManager;
use crate::script::{load_macros, Macro};

/// Marks an unused slot in entry lists.
const NONE_TOKEN: &str = "-";

/// Everything a scene load produces.
#[derive(Debug)]
pub struct SceneData {
    pub world: World,
    pub macros: Vec<Macro>,
}

/// A `[NAME]` header and the tokens up to the next header.
#[derive(Debug)]
struct Section {
    name: String,
    tokens: Vec<Token>,
}

fn malformed(file: &str, reason: impl Into<String>) -> anyhow::Error {
    SceneLoadError::Malformed {
        file: file.to_string(),
        reason: reason.into(),
    }
    .into()
}

fn read_sections(file: &str, parser: &mut TextParser) -> Result<Vec<Section>> {
    let mut sections: Vec<Section> = Vec::new();
    while let Some(token) = parser.next_token() {
        if let Some(name) = token.section_name() {
            sections.push(Section {
                name: name.to_string(),
                tokens: Vec::new(),
            });
            continue;
        }
        match sections.last_mut() {
            Some(section) => section.tokens.push(token),
            None => {
                return Err(malformed(
                    file,
                    format!("{:?} on line {} precedes any section", token.text, token.line),
                ));
            }
        }
    }
    Ok(sections)
}

fn int(file: &str, token: &Token) -> Result<i32> {
    parse_int(&token.text).ok_or_else(|| {
        malformed(
            file,
            format!("expected a number on line {}, found {:?}", token.line, token.text),
        )
    })
}

fn optional(token: &Token) -> Option<&str> {
    (token.text != NONE_TOKEN).then_some(token.text.as_str())
}

fn expect_len(file: &str, section: &Section, wanted: usize) -> Result<()> {
    if section.tokens.len() != wanted {
        return Err(malformed(
            file,
            format!(
                "[{}] needs {wanted} fields, found {}",
                section.name,
                section.tokens.len()
            ),
        ));
    }
    Ok(())
}

fn graphic(file: &str, resources: &ResourceManager, name: &str) -> Result<Graphic> {
    resources.load_graphic(name).map_err(|err| {
        SceneLoadError::Resource {
            file: file.to_string(),
            resource: name.to_string(),
            reason: format!("{err:#}"),
        }
        .into()
    })
}

fn surface(file: &str, resources: &ResourceManager, name: &str) -> Result<Surface> {
    resources.load_surface(name).map_err(|err| {
        SceneLoadError::Resource {
            file: file.to_string(),
            resource: name.to_string(),
            reason: format!("{err:#}"),
        }
        .into()
    })
}

/// Sections of an optional file, or `None` when the scene does not ship it.
fn optional_sections(resources: &ResourceManager, file: &str) -> Result<Option<Vec<Section>>> {
    match resources.text_parser(file) {
        Some(mut parser) => read_sections(file, &mut parser).map(Some),
        None => {
            debug!("optional scene file {file} not present");
            Ok(None)
        }
    }
}

/// Load every category of scene `name`.
pub fn load_scene_data(
    name: &str,
    resources: &ResourceManager,
    settings: &SceneSettings,
) -> Result<SceneData> {
    let ccg = format!("{name}.CCG");
    let mut parser = resources
        .text_parser(&ccg)
        .ok_or_else(|| SceneLoadError::MissingResource(ccg.clone()))?;
    let mut world = load_graphics(&ccg, &read_sections(&ccg, &mut parser)?, resources, settings)?;

    if let Some(sections) = optional_sections(resources, &format!("{name}.DLG"))? {
        load_dialogs(&sections, &mut world);
    }
    let fcs = format!("{name}.FCS");
    if let Some(sections) = optional_sections(resources, &fcs)? {
        load_faces(&fcs, &sections, resources, &mut world)?;
    }
    let pcs = format!("{name}.PCS");
    if let Some(sections) = optional_sections(resources, &pcs)? {
        load_persons(&pcs, &sections, resources, &mut world)?;
    }
    let ace = format!("{name}.ACE");
    if let Some(sections) = optional_sections(resources, &ace)? {
        load_areas(&ace, &sections, &mut world)?;
    }
    let anm = format!("{name}.ANM");
    if let Some(sections) = optional_sections(resources, &anm)? {
        for section in &sections {
            expect_len(&anm, section, 1)?;
            world
                .animations
                .insert(section.name.clone(), section.tokens[0].text.clone());
        }
    }
    let ins = format!("{name}.INS");
    if let Some(sections) = optional_sections(resources, &ins)? {
        load_insertions(&ins, &sections, &mut world)?;
    }
    let flm = format!("{name}.FLM");
    if let Some(sections) = optional_sections(resources, &flm)? {
        for section in &sections {
            expect_len(&flm, section, 1)?;
            world
                .films
                .insert(section.name.clone(), section.tokens[0].text.clone());
        }
    }

    let mcc = format!("{name}.MCC");
    let mut parser = resources
        .text_parser(&mcc)
        .ok_or_else(|| SceneLoadError::MissingResource(mcc.clone()))?;
    let macros = load_macros(&mut parser);

    Ok(SceneData { world, macros })
}

fn load_graphics(
    file: &str,
    sections: &[Section],
    resources: &ResourceManager,
    settings: &SceneSettings,
) -> Result<World> {
    let background = sections
        .iter()
        .find(|section| section.name == "BACKGROUND")
        .ok_or_else(|| malformed(file, "no [BACKGROUND] section"))?;
    expect_len(file, background, 1)?;
    let mut world = World::new(
        surface(file, resources, &background.tokens[0].text)?,
        settings,
    );

    for section in sections {
        match section.name.as_str() {
            "BACKGROUND" => {}
            "ELEMENTS" => {
                if section.tokens.len() % 4 != 0 {
                    return Err(malformed(file, "[ELEMENTS] entries are `id x y res`"));
                }
                for entry in section.tokens.chunks_exact(4) {
                    let id = &entry[0].text;
                    let (x, y) = (int(file, &entry[1])?, int(file, &entry[2])?);
                    let graphic = graphic(file, resources, &entry[3].text)?;
                    if world
                        .elements
                        .insert(id.clone(), Element::new(id, x, y, graphic))
                        .is_some()
                    {
                        warn!("{file}: element {id} defined twice; keeping the last");
                    }
                }
            }
            "WALK" => {
                let mut polygons = Vec::new();
                let mut tokens = section.tokens.iter();
                while let Some(count) = tokens.next() {
                    let count = int(file, count)?;
                    if count < 3 {
                        return Err(malformed(file, format!("walk polygon with {count} points")));
                    }
                    let mut points = Vec::with_capacity(count as usize);
                    for _ in 0..count {
                        let (Some(x), Some(y)) = (tokens.next(), tokens.next()) else {
                            return Err(malformed(file, "walk polygon ends early"));
                        };
                        points.push(Point::new(int(file, x)?, int(file, y)?));
                    }
                    polygons.push(WalkPolygon::new(points));
                }
                world.walk = WalkMap::new(polygons);
            }
            other => warn!("{file}: ignoring unknown section [{other}]"),
        }
    }
    Ok(world)
}

fn load_dialogs(sections: &[Section], world: &mut World) {
    for section in sections {
        let answers = section
            .tokens
            .iter()
            .map(|token| DialogAnswer {
                text: token.text.replace('_', " "),
                enabled: true,
            })
            .collect();
        world.dialogs.insert(
            section.name.clone(),
            Dialog {
                id: section.name.clone(),
                answers,
            },
        );
    }
}

fn load_faces(
    file: &str,
    sections: &[Section],
    resources: &ResourceManager,
    world: &mut World,
) -> Result<()> {
    for section in sections {
        expect_len(file, section, 1)?;
        let face = Face {
            person: section.name.clone(),
            graphic: graphic(file, resources, &section.tokens[0].text)?,
        };
        world.faces.insert(section.name.clone(), face);
    }
    Ok(())
}

fn load_persons(
    file: &str,
    sections: &[Section],
    resources: &ResourceManager,
    world: &mut World,
) -> Result<()> {
    for section in sections {
        expect_len(file, section, 11)?;
        let tokens = &section.tokens;
        let position = Point::new(int(file, &tokens[0])?, int(file, &tokens[1])?);
        let speed = int(file, &tokens[2])?;
        let mut graphics: [Option<Graphic>; 8] = Default::default();
        for (slot, token) in graphics.iter_mut().zip(&tokens[3..]) {
            if let Some(name) = optional(token) {
                *slot = Some(graphic(file, resources, name)?);
            }
        }
        world.persons.insert(
            section.name.clone(),
            Person::new(&section.name, position, speed, graphics),
        );
    }
    Ok(())
}

fn load_areas(file: &str, sections: &[Section], world: &mut World) -> Result<()> {
    for section in sections {
        expect_len(file, section, 5)?;
        let tokens = &section.tokens;
        let rect = Rect::new(
            int(file, &tokens[0])?,
            int(file, &tokens[1])?,
            int(file, &tokens[2])?,
            int(file, &tokens[3])?,
        );
        if rect.is_empty() {
            warn!("{file}: area {} is empty", section.name);
        }
        world.areas.insert(
            section.name.clone(),
            Area {
                id: section.name.clone(),
                rect,
                enabled: true,
                macro_id: optional(&tokens[4]).map(str::to_string),
            },
        );
    }
    Ok(())
}

fn load_insertions(file: &str, sections: &[Section], world: &mut World) -> Result<()> {
    for section in sections {
        expect_len(file, section, 3)?;
        let tokens = &section.tokens;
        world.insertions.insert(
            section.name.clone(),
            Insertion {
                id: section.name.clone(),
                resource: tokens[0].text.clone(),
                position: Point::new(int(file, &tokens[1])?, int(file, &tokens[2])?),
                animation: None,
            },
        );
    }
    Ok(())
}
