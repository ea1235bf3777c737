/// A bookable venue. The registry is fixed at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hall {
    pub id: &'static str,
    pub name: &'static str,
    pub location: &'static str,
    pub capacity: u32,
}

const fn hall(id: &'static str, name: &'static str, location: &'static str, capacity: u32) -> Hall {
    Hall {
        id,
        name,
        location,
        capacity,
    }
}

pub static HALLS: [Hall; 19] = [
    hall("platinum", "Platinum Hall", "Mini Theater", 300),
    hall("titanium", "Titanium Hall", "AB II – Gallery Hall", 250),
    hall("adithya", "Adithya Hall", "KSRCE – IQAC Hall", 200),
    hall("hemavathi", "Hemavathi Hall", "C Block", 150),
    hall("pearl", "Pearl Hall", "ECE", 180),
    hall("sapphire", "Sapphire Hall", "Choest Court – A Block", 200),
    hall("edison", "Edison Hall", "Main Block", 120),
    hall("mounteverest", "Mount Everest Hall", "Conference Hall – C Block", 280),
    hall("diamond", "Diamond Hall", "MECH", 220),
    hall("emerald", "Emerald Hall", "CSE", 160),
    hall("dharmavathi", "Dharmavathi Hall", "Seminar Hall – B Block", 240),
    hall("chandrayan", "Chandrayan Hall", "Multi Utility Hall – F Block", 350),
    hall("garnet", "Garnet Hall", "IT", 180),
    hall("citrine", "Citrine Hall", "Conference Hall", 150),
    hall("dhenuka", "Dhenuka Hall", "C Block", 200),
    hall("darbar", "Darbar Hall", "C Block", 280),
    hall("spinel", "Spinel Hall", "Mini Conference Hall", 100),
    hall("ruby", "Ruby Hall", "KSRIET – IQAC Hall", 180),
    hall("display", "Display Hall", "Main Block", 120),
];

pub fn lookup(id: &str) -> Option<&'static Hall> {
    HALLS.iter().find(|h| h.id == id)
}

pub fn all() -> &'static [Hall] {
    &HALLS
}
