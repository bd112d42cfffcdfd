use orlando_formats::{BlitOptions, Surface};

use super::World;

/// Compose a frame: background, elements by id, insertions, persons with
/// the player last, the face close-up, then the fade.
pub fn render(world: &World, target: &mut Surface) {
    let scroll = world.scroll.x;
    target.fill(0);
    target.blit(
        &world.background,
        world.background.bounds(),
        -scroll,
        0,
        BlitOptions::OPAQUE,
    );

    for element in world.elements.values().filter(|element| element.visible) {
        let rect = element.window.rect();
        let surface = element.window.surface();
        let options = BlitOptions {
            flip_x: element.flip,
            ..BlitOptions::SPRITE
        };
        target.blit(surface, surface.bounds(), rect.left - scroll, rect.top, options);
    }

    for insertion in world.insertions.values() {
        if let Some(animation) = insertion.animation.as_ref() {
            let surface = animation.surface();
            target.blit(
                surface,
                surface.bounds(),
                insertion.position.x - scroll,
                insertion.position.y,
                BlitOptions::SPRITE,
            );
        }
    }

    let player = world.player.as_deref();
    let persons = world
        .persons
        .values()
        .filter(|person| Some(person.id.as_str()) != player)
        .chain(player.and_then(|id| world.persons.get(id)));
    for person in persons.filter(|person| person.visible) {
        let (Some(surface), Some(rect)) = (person.current_surface(), person.bounds()) else {
            continue;
        };
        target.blit(surface, surface.bounds(), rect.left - scroll, rect.top, BlitOptions::SPRITE);
    }

    if let Some(face) = world.face.as_ref().and_then(|person| world.faces.get(person)) {
        let surface = face.graphic.surface();
        target.blit(surface, surface.bounds(), 0, 0, BlitOptions::SPRITE);
    }

    target.dim(world.fade.level);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::entities::{Element, Graphic, Person};
    use crate::scene::walk::Point;
    use crate::scene::SceneSettings;

    fn solid(width: usize, height: usize, color: u16) -> Surface {
        Surface::from_pixels(width, height, vec![color; width * height]).unwrap()
    }

    fn world() -> World {
        let settings = SceneSettings {
            screen_width: 4,
            screen_height: 2,
            ..SceneSettings::default()
        };
        World::new(solid(8, 2, 0x0001), &settings)
    }

    #[test]
    fn elements_draw_over_the_scrolled_background() {
        let mut world = world();
        world
            .elements
            .insert("A".into(), Element::new("A", 5, 0, Graphic::Still(solid(1, 1, 0x7C00))));
        world.set_scroll(4);

        let mut frame = Surface::new(4, 2);
        render(&world, &mut frame);
        assert_eq!(frame.pixel(1, 0), Some(0x7C00));
        assert_eq!(frame.pixel(0, 0), Some(0x0001));

        world.elements.get_mut("A").unwrap().visible = false;
        render(&world, &mut frame);
        assert_eq!(frame.pixel(1, 0), Some(0x0001));
    }

    #[test]
    fn the_player_is_drawn_last() {
        let mut world = world();
        for (id, color) in [("A", 0x0002), ("B", 0x0003)] {
            let mut graphics: [Option<Graphic>; 8] = Default::default();
            graphics[0] = Some(Graphic::Still(solid(1, 1, color)));
            world
                .persons
                .insert(id.into(), Person::new(id, Point::new(0, 1), 1, graphics));
        }

        let mut frame = Surface::new(4, 2);
        render(&world, &mut frame);
        assert_eq!(frame.pixel(0, 0), Some(0x0003));

        world.player = Some("A".into());
        render(&world, &mut frame);
        assert_eq!(frame.pixel(0, 0), Some(0x0002));
    }
}
