//! Field and submit vocabularies, in several languages.

use crate::browser::DomElement;

use super::normalize;

/// A kind of form field a locator can name ("password", "E-Mail", ...)
#[derive(Debug)]
pub struct FieldConcept {
    pub name: &'static str,
    pub keywords: &'static [&'static str],
    pub input_types: &'static [&'static str],
    pub autocomplete: &'static [&'static str],
}

pub const FIELDS: &[FieldConcept] = &[
    FieldConcept {
        name: "password",
        keywords: &[
            "password", "pass", "pwd", "passcode", "passwort", "kennwort", "contraseña",
            "contrasena", "mot de passe", "senha", "wachtwoord", "パスワード", "密码",
        ],
        input_types: &["password"],
        autocomplete: &["current-password", "new-password"],
    },
    FieldConcept {
        name: "email",
        keywords: &[
            "email", "e-mail", "e mail", "mail", "correo", "correo electrónico", "courriel",
            "adresse e-mail", "e-mail-adresse", "メール", "邮箱", "电子邮件",
        ],
        input_types: &["email"],
        autocomplete: &["email"],
    },
    FieldConcept {
        name: "username",
        keywords: &[
            "username", "user name", "user", "login", "user id", "benutzername", "benutzer",
            "usuario", "nombre de usuario", "identifiant", "utilisateur", "ユーザー名", "用户名",
        ],
        input_types: &[],
        autocomplete: &["username"],
    },
    FieldConcept {
        name: "phone",
        keywords: &[
            "phone", "telephone", "mobile", "tel", "cell", "telefon", "telefonnummer",
            "teléfono", "telefono", "téléphone", "portable", "電話", "电话", "手机",
        ],
        input_types: &["tel"],
        autocomplete: &["tel", "tel-national"],
    },
    FieldConcept {
        name: "search",
        keywords: &["search", "query", "suche", "suchen", "buscar", "búsqueda", "rechercher", "recherche", "検索", "搜索"],
        input_types: &["search"],
        autocomplete: &[],
    },
    FieldConcept {
        name: "first name",
        keywords: &["first name", "given name", "vorname", "nombre", "prénom", "prenom"],
        input_types: &[],
        autocomplete: &["given-name"],
    },
    FieldConcept {
        name: "last name",
        keywords: &["last name", "surname", "family name", "nachname", "apellido", "nom de famille"],
        input_types: &[],
        autocomplete: &["family-name"],
    },
];

/// Words that decorate a field reference without naming it
const FILLER: &[&str] = &[
    "your", "the", "a", "an", "enter", "type", "field", "input", "box", "here", "address", "number",
    "ihr", "ihre", "tu", "su", "votre",
];

/// Submit-control vocabulary used to pick the control an Enter press triggers
pub const SUBMIT_KEYWORDS: &[&str] = &[
    "log in", "login", "sign in", "signin", "sign up", "register", "submit", "save", "confirm",
    "continue", "next", "search", "send", "go", "ok", "apply", "done",
    // de
    "anmelden", "einloggen", "absenden", "speichern", "bestätigen", "weiter", "suchen", "senden",
    // es
    "iniciar sesión", "entrar", "enviar", "guardar", "confirmar", "continuar", "siguiente", "buscar",
    // fr
    "connexion", "se connecter", "envoyer", "enregistrer", "valider", "confirmer", "continuer",
    "suivant", "rechercher",
    // pt
    "entrar", "salvar", "próximo",
    // ja / zh
    "ログイン", "送信", "保存", "検索", "登录", "提交", "确认", "搜索",
];

fn strip_filler(query: &str) -> String {
    normalize(query)
        .split(' ')
        .filter(|word| !FILLER.contains(word))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Field concept a locator names, if it names one
pub fn field_concept(query: &str) -> Option<&'static FieldConcept> {
    let stripped = strip_filler(query);
    if stripped.is_empty() {
        return None;
    }
    FIELDS
        .iter()
        .find(|concept| concept.keywords.iter().any(|kw| *kw == stripped))
}

impl FieldConcept {
    /// Whether a form control is this kind of field, by type, autocomplete
    /// token or attribute alias
    pub fn matches(&self, element: &DomElement) -> bool {
        let input_type = element.input_type.to_lowercase();
        if self.input_types.contains(&input_type.as_str()) {
            return true;
        }
        let autocomplete = element.autocomplete.to_lowercase();
        if autocomplete
            .split_whitespace()
            .any(|token| self.autocomplete.contains(&token))
        {
            return true;
        }
        // A password-typed input is never an alias match for another field
        if input_type == "password" {
            return false;
        }
        [
            &element.name,
            &element.id,
            &element.label,
            &element.placeholder,
            &element.aria_label,
        ]
        .iter()
        .map(|value| strip_filler(&value.replace(['_', '-'], " ")))
        .any(|value| self.keywords.iter().any(|kw| contains_word(&value, kw)))
    }
}

/// Submit keyword matched by a control's text, if any
pub fn submit_keyword(text: &str) -> Option<&'static str> {
    let text = normalize(text);
    if text.is_empty() {
        return None;
    }
    SUBMIT_KEYWORDS
        .iter()
        .copied()
        .find(|kw| text == *kw || contains_word(&text, kw))
}

/// `needle` occurs in `haystack` delimited by non-alphanumerics
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(needle).any(|(start, _)| {
        let end = start + needle.len();
        let before = haystack[..start].chars().next_back();
        let after = haystack[end..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}
