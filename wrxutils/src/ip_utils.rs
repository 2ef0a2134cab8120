use get_if_addrs::{IfAddr, get_if_addrs};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Résultat de la classification d'un pair par rapport au réseau local.
///
/// Les règles d'authentification assouplies (auto-login, admin sans mot de
/// passe) ne s'appliquent qu'aux pairs `IsLocal`. `CannotDetermine` est un
/// résultat distinct d'un rejet : l'appelant peut réessayer une fois que les
/// informations de routage sont disponibles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Locality {
    IsLocal,
    NotLocal,
    CannotDetermine,
}

/// Devine l'adresse IP locale de la machine.
///
/// Crée un socket UDP lié à `0.0.0.0:0` et tente une connexion (non effective
/// pour UDP) vers un serveur DNS public, puis récupère l'adresse locale du
/// socket. En cas d'échec à n'importe quelle étape, retourne `127.0.0.1`.
///
/// # Examples
///
/// ```
/// let ip = wrxutils::guess_local_ip();
/// assert!(!ip.is_empty());
/// ```
pub fn guess_local_ip() -> String {
    match UdpSocket::bind("0.0.0.0:0") {
        Ok(socket) => {
            if socket.connect("8.8.8.8:80").is_ok() {
                if let Ok(local_addr) = socket.local_addr() {
                    return local_addr.ip().to_string();
                }
            }
            "127.0.0.1".to_string()
        }
        Err(_) => "127.0.0.1".to_string(),
    }
}

/// Classe l'adresse d'un pair par rapport aux sous-réseaux attachés.
///
/// Le pair est `IsLocal` s'il s'agit d'une adresse de loopback ou si son
/// adresse IPv4 appartient au sous-réseau (adresse & masque) d'une des
/// interfaces non-loopback de la machine. Si l'adresse ne peut pas être
/// analysée, si l'énumération des interfaces échoue ou si aucune interface
/// IPv4 non-loopback n'existe, le résultat est `CannotDetermine`.
pub fn classify_peer(remote: &str) -> Locality {
    let peer: Ipv4Addr = match remote.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4,
        Ok(IpAddr::V6(v6)) => {
            if v6.is_loopback() {
                return Locality::IsLocal;
            }
            // Seuls les sous-réseaux IPv4 sont classés
            match v6.to_ipv4_mapped() {
                Some(v4) => v4,
                None => return Locality::CannotDetermine,
            }
        }
        Err(_) => return Locality::CannotDetermine,
    };

    if peer.is_loopback() {
        return Locality::IsLocal;
    }

    let interfaces = match get_if_addrs() {
        Ok(ifs) => ifs,
        Err(_) => return Locality::CannotDetermine,
    };

    let mut seen_v4 = false;
    for iface in interfaces {
        if let IfAddr::V4(v4) = iface.addr {
            if v4.ip.is_loopback() {
                continue;
            }
            seen_v4 = true;
            if same_subnet(peer, v4.ip, v4.netmask) {
                return Locality::IsLocal;
            }
        }
    }

    if seen_v4 {
        Locality::NotLocal
    } else {
        Locality::CannotDetermine
    }
}

fn same_subnet(a: Ipv4Addr, b: Ipv4Addr, mask: Ipv4Addr) -> bool {
    let a = u32::from(a);
    let b = u32::from(b);
    let m = u32::from(mask);
    (a & m) == (b & m)
}
